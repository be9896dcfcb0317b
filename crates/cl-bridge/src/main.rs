use cl_bridge::config::{DEFAULT_ENTRY, DEFAULT_KERNEL_PATH, DEFAULT_LEN};
use cl_bridge::{BridgeError, OpenCl, Session};

use clap::Parser;
use std::{path::PathBuf, process::ExitCode};

#[cfg(feature = "metrics")]
use cl_bridge::summary;

/// Adds two constant vectors on the first OpenCL device found.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Kernel source file
    #[arg(long, default_value = DEFAULT_KERNEL_PATH)]
    kernel: PathBuf,

    /// Kernel entry point
    #[arg(long, default_value = DEFAULT_ENTRY)]
    entry: String,

    /// Number of elements
    #[arg(long, default_value_t = DEFAULT_LEN)]
    len: usize,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    println!("=== OpenCL Bridge Demo ===");
    let code = match demo(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            println!("Failed.");
            ExitCode::FAILURE
        }
    };

    #[cfg(feature = "metrics")]
    summary();

    code
}

fn demo(args: &Args) -> Result<(), BridgeError> {
    let session = Session::locate(OpenCl)?.compile(&args.kernel, &args.entry)?;

    let a = vec![1.0_f32; args.len];
    let b = vec![2.0_f32; args.len];
    let mut c = vec![0.0_f32; args.len];

    println!("Running Vector Add on {} elements...", args.len);
    session.dispatch_vector_add(&a, &b, &mut c)?;

    let head: Vec<String> = c.iter().take(5).map(|x| x.to_string()).collect();
    println!("Success! First 5 results: {}", head.join(" "));

    session.teardown();
    Ok(())
}
