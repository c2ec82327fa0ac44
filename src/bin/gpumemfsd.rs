//! gpumemfs daemon
//!
//! Mounts the GPU memory filesystem and serves it until SIGINT/SIGTERM.
//! Startup order matters: configuration, logging, GPU driver, then the
//! mount. Any startup failure exits with status 1; a clean shutdown
//! releases every allocation and exits 0.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fuser::MountOption;

use gpumemfs::config::DaemonConfig;
use gpumemfs::fs::{GpuMemFs, GpuMemFuse};
use gpumemfs::gpu::CudaBinding;
use gpumemfs::server::signals;

/// GPU memory filesystem daemon
#[derive(Parser, Debug)]
#[command(name = "gpumemfsd", version, about)]
struct Args {
    /// Mount point for the filesystem
    mountpoint: PathBuf,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// CUDA device ordinal (overrides the config file)
    #[arg(long)]
    device: Option<u32>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Allow other users to access the mount point
    #[arg(long)]
    allow_other: bool,
}

fn main() {
    let args = Args::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });

    // An explicitly named config file that fails to load is fatal; with no
    // --config the defaults are used.
    let mut config = match &args.config {
        Some(path) => match DaemonConfig::from_file(&path.to_string_lossy()) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => DaemonConfig::default(),
    };

    if let Some(device) = args.device {
        config.gpu.device = device;
    }
    if let Some(level) = &args.log_level {
        config.daemon.log_level = level.clone();
    }
    if args.allow_other {
        config.mount.allow_other = true;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    gpumemfs::logging::init(&config.daemon.log_level);

    tracing::info!("Starting gpumemfs daemon");
    tracing::info!("Mount point: {}", args.mountpoint.display());
    tracing::info!("GPU device: {}", config.gpu.device);

    let binding = match CudaBinding::new(config.gpu.device) {
        Ok(binding) => binding,
        Err(e) => {
            eprintln!("Failed to initialize GPU driver: {}", e);
            std::process::exit(1);
        }
    };

    let fs = Arc::new(GpuMemFs::new(Arc::new(binding)));

    let mut options = vec![
        MountOption::FSName("gpumemfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if config.mount.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.mount.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }

    signals::setup_signal_handlers();

    let session = match fuser::spawn_mount2(GpuMemFuse::new(fs.clone()), &args.mountpoint, &options)
    {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to mount {}: {}", args.mountpoint.display(), e);
            std::process::exit(1);
        }
    };

    tracing::info!("Serving (Press Ctrl+C to stop)");

    while !signals::shutdown_requested() {
        std::thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("Shutdown signal received, unmounting");

    // Unmounting delivers destroy(), which drains the registry. The second
    // shutdown is a no-op unless the kernel never delivered destroy().
    drop(session);
    fs.shutdown();

    tracing::info!("gpumemfs daemon stopped");
}
