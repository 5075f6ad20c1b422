use clap::Parser;
use splatpipe_lib::structures::RECORD_SIZE;
use splatpipe_lib::{spawn_worker, Pipeline, Request, Response};
use std::error::Error;
use std::fs;
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "Splat Pipeline",
    version = "1.0",
    author = "Denis Avvakumov",
    about = "Decodes splat files, packs the GPU payload and depth-sorts it for a view"
)]
struct Cli {
    #[arg(
        short = 'i',
        long = "input",
        value_name = "INPUT",
        required = true,
        help = "Path to the input file (PLY or canonical buffer)."
    )]
    input: String,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "OUTPUT",
        help = "Path for the decoded canonical buffer (written with --persist)."
    )]
    output: Option<String>,

    #[arg(
        short = 'p',
        long = "payload",
        value_name = "PAYLOAD",
        help = "Path for the packed GPU payload."
    )]
    payload: Option<String>,

    #[arg(
        short = 'd',
        long = "depth",
        value_name = "DEPTH",
        help = "Path for the depth order (little-endian u32 indices)."
    )]
    depth: Option<String>,

    #[arg(
        long = "view",
        value_name = "MATRIX",
        allow_hyphen_values = true,
        value_parser = parse_view,
        help = "Column-major view-projection matrix as 16 comma-separated floats."
    )]
    view: Option<[f32; 16]>,

    #[arg(
        long = "eye",
        value_name = "X,Y,Z",
        default_value = "0,0,5",
        allow_hyphen_values = true,
        value_parser = parse_vec3,
        help = "Camera position, used when --view is not given."
    )]
    eye: [f32; 3],

    #[arg(
        long = "target",
        value_name = "X,Y,Z",
        default_value = "0,0,0",
        allow_hyphen_values = true,
        value_parser = parse_vec3,
        help = "Point the camera looks at, used when --view is not given."
    )]
    target: [f32; 3],

    #[arg(
        long = "persist",
        default_value = "false",
        requires = "output",
        help = "Persist the decoded canonical buffer to --output."
    )]
    persist: bool,

    #[arg(
        short = 'a',
        long = "async",
        default_value = "false",
        help = "Run the pipeline as a background worker task."
    )]
    async_mode: bool,

    #[arg(
        short = 'q',
        long = "queue",
        value_name = "CAPACITY",
        default_value = "16",
        help = "Channel capacity of the background worker."
    )]
    queue: usize,

    #[arg(short = 'v', long = "verbose", help = "Log pipeline internals.")]
    verbose: bool,
}

fn parse_floats(s: &str, expected: usize) -> Result<Vec<f32>, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("'{}': {}", v, e)))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != expected {
        return Err(format!(
            "expected {} values, got {}",
            expected,
            values.len()
        ));
    }
    Ok(values)
}

fn parse_view(s: &str) -> Result<[f32; 16], String> {
    let v = parse_floats(s, 16)?;
    let mut m = [0.0f32; 16];
    m.copy_from_slice(&v);
    Ok(m)
}

fn parse_vec3(s: &str) -> Result<[f32; 3], String> {
    let v = parse_floats(s, 3)?;
    Ok([v[0], v[1], v[2]])
}

/// Column-major look-at view matrix. Only the depth row matters for sorting.
fn look_at(eye: [f32; 3], target: [f32; 3]) -> Vec<f32> {
    let d = [target[0] - eye[0], target[1] - eye[1], target[2] - eye[2]];
    let len = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
    let f = if len > 0.0 {
        d.map(|c| c / len)
    } else {
        [0.0, 0.0, -1.0]
    };

    let mut m = vec![0.0f32; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[15] = 1.0;
    m[2] = -f[0];
    m[6] = -f[1];
    m[10] = -f[2];
    m[14] = f[0] * eye[0] + f[1] * eye[1] + f[2] * eye[2];
    m
}

fn write_or_exit(path: &str, data: &[u8]) {
    fs::write(path, data).unwrap_or_else(|e| {
        eprintln!("Error writing output '{}': {}", path, e);
        process::exit(1);
    });
    println!("Successfully wrote {} bytes to '{}'.", data.len(), path);
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    let raw_data = fs::read(&cli.input).unwrap_or_else(|e| {
        eprintln!("Error reading input file {}: {}", cli.input, e);
        process::exit(1);
    });

    let mode = if cli.async_mode {
        "Asynchronous"
    } else {
        "Synchronous"
    };
    println!(
        "Mode: {}\nInput: {} | {} bytes",
        mode,
        cli.input,
        raw_data.len()
    );

    let view_projection = cli
        .view
        .map(|m| m.to_vec())
        .unwrap_or_else(|| look_at(cli.eye, cli.target));
    let requests = vec![
        Request::DecodeFile {
            bytes: raw_data,
            persist_after_decode: cli.persist,
        },
        Request::ViewUpdate { view_projection },
    ];

    let start = Instant::now();

    let responses: Vec<Response> = if cli.async_mode {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        rt.block_on(async {
            let (worker, handle) = spawn_worker(cli.queue);
            let (sender, mut receiver) = (worker.requests, worker.responses);
            for request in requests {
                sender.send(request).await?;
            }
            drop(sender);

            let mut out = Vec::new();
            while let Some(response) = receiver.recv().await {
                out.push(response);
            }
            handle.await?;
            Ok::<Vec<Response>, Box<dyn Error + Send + Sync>>(out)
        })?
    } else {
        let mut pipeline = Pipeline::new();
        requests
            .into_iter()
            .flat_map(|request| pipeline.handle(request))
            .collect()
    };

    let elapsed = start.elapsed().as_millis();
    println!("Pipeline Time: {} ms", elapsed);

    for response in responses {
        match response {
            Response::CanonicalReady { bytes, persist } => {
                println!("Decoded {} splats", bytes.len() / RECORD_SIZE);
                if let (true, Some(path)) = (persist, cli.output.as_deref()) {
                    write_or_exit(path, &bytes);
                }
            }
            Response::PayloadReady {
                payload,
                vertex_count,
            } => {
                println!("Packed GPU payload for {} splats", vertex_count);
                if let Some(path) = cli.payload.as_deref() {
                    write_or_exit(path, payload.as_bytes());
                }
            }
            Response::DepthReady {
                permutation,
                vertex_count,
            } => {
                println!("Depth-sorted {} splats", vertex_count);
                if let Some(path) = cli.depth.as_deref() {
                    let bytes: Vec<u8> =
                        permutation.iter().flat_map(|i| i.to_le_bytes()).collect();
                    write_or_exit(path, &bytes);
                }
            }
            Response::DecodeFailed { error } => {
                eprintln!("Error decoding '{}': {}", cli.input, error);
                return Err(error.into());
            }
        }
    }

    Ok(())
}
