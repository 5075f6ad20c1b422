use crate::common::{clamp_u8, normalize_quat, quantize_unit, sigmoid, SH_C0};
use crate::error::FormatError;
use crate::ply::{Element, Field};
use crate::structures::{CanonicalRecord, FALLBACK_ROTATION, FALLBACK_SCALE};

/// Rows of a standard splat PLY in file order, with a per-row importance
/// score used only for ordering.
#[derive(Debug, Default)]
pub struct StandardRows {
    pub records: Vec<CanonicalRecord>,
    pub importance: Vec<f32>,
}

struct Shape {
    scale: [Field; 3],
    rot: [Field; 4],
}

enum Color {
    Harmonics([Field; 3]),
    Direct([Option<Field>; 3]),
}

fn require3(vertex: &Element, names: [&str; 3]) -> Result<[Field; 3], FormatError> {
    Ok([
        vertex.require(names[0])?,
        vertex.require(names[1])?,
        vertex.require(names[2])?,
    ])
}

pub fn decode_standard(vertex: &Element, body: &[u8]) -> Result<StandardRows, FormatError> {
    let xyz = require3(vertex, ["x", "y", "z"])?;

    let shape = if vertex.has("scale_0") {
        Some(Shape {
            scale: require3(vertex, ["scale_0", "scale_1", "scale_2"])?,
            rot: [
                vertex.require("rot_0")?,
                vertex.require("rot_1")?,
                vertex.require("rot_2")?,
                vertex.require("rot_3")?,
            ],
        })
    } else {
        None
    };

    let color = if vertex.has("f_dc_0") {
        Color::Harmonics(require3(vertex, ["f_dc_0", "f_dc_1", "f_dc_2"])?)
    } else {
        Color::Direct([
            vertex.field("red"),
            vertex.field("green"),
            vertex.field("blue"),
        ])
    };
    let opacity = vertex.field("opacity");

    let rows = vertex.rows(body)?;
    let mut out = StandardRows {
        records: Vec::with_capacity(vertex.count),
        importance: Vec::with_capacity(vertex.count),
    };
    if vertex.stride == 0 {
        return Ok(out);
    }

    for row in rows.chunks_exact(vertex.stride) {
        let position = xyz.map(|f| f.f32(row));
        let alpha = opacity.map(|f| sigmoid(f.f32(row)));

        let (scale, rotation, importance) = match &shape {
            Some(shape) => {
                let log_scale = shape.scale.map(|f| f.f32(row));
                let scale = log_scale.map(f32::exp);
                let q = normalize_quat(shape.rot.map(|f| f.f32(row)));
                let size = scale[0] * scale[1] * scale[2];
                (scale, q.map(quantize_unit), size * alpha.unwrap_or(1.0))
            }
            None => ([FALLBACK_SCALE; 3], FALLBACK_ROTATION, 0.0),
        };

        let [r, g, b] = match &color {
            Color::Harmonics(dc) => dc.map(|f| clamp_u8((0.5 + SH_C0 * f.f32(row)) * 255.0)),
            Color::Direct(channels) => channels.map(|f| f.map_or(255, |f| clamp_u8(f.f32(row)))),
        };
        let a = alpha.map_or(255, |a| clamp_u8(a * 255.0));

        out.records
            .push(CanonicalRecord::new(position, scale, [r, g, b, a], rotation));
        out.importance.push(importance);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{unpack_half2x16, unquantize_unit};
    use crate::payload::{pack_splat, COVARIANCE_GAIN};
    use crate::ply::parse_header;

    fn ply(properties: &[&str], rows: &[&[f32]]) -> Vec<u8> {
        let mut data = format!(
            "ply\nformat binary_little_endian 1.0\nelement vertex {}\n",
            rows.len()
        );
        for p in properties {
            data.push_str(&format!("property float {}\n", p));
        }
        data.push_str("end_header\n");
        let mut data = data.into_bytes();
        for row in rows {
            for v in row.iter() {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        data
    }

    fn decode(data: &[u8]) -> Result<StandardRows, FormatError> {
        let header = parse_header(data)?;
        let vertex = header
            .element("vertex")
            .ok_or(FormatError::MissingElement("vertex"))?;
        decode_standard(vertex, &data[header.body_start..])
    }

    #[test]
    fn test_full_splat_row() {
        let data = ply(
            &[
                "x", "y", "z", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2",
                "rot_3", "opacity", "f_dc_0", "f_dc_1", "f_dc_2",
            ],
            &[&[
                1.0, 2.0, 3.0, 0.0, -1.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, -10.0,
            ]],
        );
        let rows = decode(&data).expect("decodes");
        let record = rows.records[0];
        assert_eq!(record.position(), [1.0, 2.0, 3.0]);
        let scale = record.scale();
        assert!((scale[0] - 1.0).abs() < 1e-6);
        assert!((scale[1] - (-1.0f32).exp()).abs() < 1e-6);
        assert!((scale[2] - 1.0f32.exp()).abs() < 1e-5);
        assert_eq!(record.rotation, [255, 128, 128, 128]);
        // sigmoid(0) = 0.5
        assert_eq!(record.color, [128, 199, 0, 128]);
        assert!((rows.importance[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_encoded_quaternion_stays_unit() {
        let quats: [[f32; 4]; 4] = [
            [0.3, -0.4, 0.5, 0.1],
            [1.0, 1.0, 1.0, 1.0],
            [-2.0, 0.5, 0.0, 7.0],
            [0.0, 0.0, -1.0, 0.0],
        ];
        let rows: Vec<Vec<f32>> = quats
            .iter()
            .map(|q| vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, q[0], q[1], q[2], q[3]])
            .collect();
        let row_refs: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let data = ply(
            &[
                "x", "y", "z", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2",
                "rot_3",
            ],
            &row_refs,
        );
        for record in decode(&data).expect("decodes").records {
            let q = record.rotation.map(unquantize_unit);
            let norm = q.iter().map(|c| c * c).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() <= 1.0 / 128.0 + 1e-6, "norm {}", norm);
            for c in q {
                assert!((-1.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn test_fallbacks_without_shape_or_color() {
        let data = ply(&["x", "y", "z"], &[&[4.0, 5.0, 6.0]]);
        let rows = decode(&data).expect("decodes");
        let record = rows.records[0];
        assert_eq!(record.scale(), [FALLBACK_SCALE; 3]);
        assert_eq!(record.rotation, [1.0, 0.0, 0.0, 0.0].map(quantize_unit));
        assert_eq!(record.color, [255, 255, 255, 255]);
        assert_eq!(rows.importance, vec![0.0]);

        // The fallback shape packs to a small isotropic footprint.
        let covariance = pack_splat(&record).covariance;
        let (a, b) = unpack_half2x16(covariance[0]);
        let (c, d) = unpack_half2x16(covariance[1]);
        let (e, f) = unpack_half2x16(covariance[2]);
        let expected = FALLBACK_SCALE * FALLBACK_SCALE * COVARIANCE_GAIN;
        for diagonal in [a, d, f] {
            assert!((diagonal - expected).abs() < expected * 0.01, "{}", diagonal);
        }
        for off_diagonal in [b, c, e] {
            assert!(off_diagonal.abs() < expected * 0.01, "{}", off_diagonal);
        }
    }

    #[test]
    fn test_direct_color_channels() {
        let header = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
property float x\nproperty float y\nproperty float z\n\
property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n";
        let mut data = header.to_vec();
        for v in [0.0f32, 0.0, 0.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[10, 20, 30]);
        let rows = decode(&data).expect("decodes");
        assert_eq!(rows.records[0].color, [10, 20, 30, 255]);
    }

    #[test]
    fn test_partial_shape_is_rejected() {
        let data = ply(&["x", "y", "z", "scale_0"], &[&[0.0, 0.0, 0.0, 0.0]]);
        assert_eq!(
            decode(&data).unwrap_err(),
            FormatError::MissingProperty {
                element: "vertex".to_string(),
                property: "scale_1".to_string()
            }
        );
    }

    #[test]
    fn test_missing_position_is_rejected() {
        let data = ply(&["x", "z"], &[&[0.0, 0.0]]);
        assert!(matches!(
            decode(&data),
            Err(FormatError::MissingProperty { property, .. }) if property == "y"
        ));
    }
}
