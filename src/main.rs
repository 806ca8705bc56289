#![warn(clippy::all, rust_2018_idioms)]

use awsmessaging::app::api_server;
use awsmessaging::app::aws::load_sdk_config;
use awsmessaging::app::config::MessagingConfig;
use awsmessaging::app::messaging::{ApiManager, Backend, ResourceContext, ServiceRegistry};
use awsmessaging::app::mock::MockCloud;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

const DEFAULT_LOG_FILTER: &str =
    "awsmessaging=info,aws_config=warn,aws_smithy_runtime=warn,hyper=warn";

/// Command line: `mock`, `norest`, `-env <name>`, `-config <path>`.
#[derive(Debug, Default, PartialEq)]
struct Args {
    mock: bool,
    no_rest: bool,
    env: Option<String>,
    config: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "mock" => parsed.mock = true,
                "norest" => parsed.no_rest = true,
                "-env" => parsed.env = args.next(),
                "-config" => parsed.config = args.next().map(PathBuf::from),
                other => eprintln!("Ignoring unknown argument: {}", other),
            }
        }
        parsed
    }
}

fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "", "awsmessaging")
        .map(|dirs| dirs.data_dir().join("logs"))
}

fn open_log_file() -> Option<(std::fs::File, PathBuf)> {
    let log_dir = log_dir()?;
    let _ = std::fs::create_dir_all(&log_dir);
    let log_path = log_dir.join("awsmessaging.log");

    let file = match std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Could not open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = file.metadata() {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&log_path, perms) {
                eprintln!("[SECURITY] Failed to set log file permissions: {}", e);
            }
        }
    }

    Some((file, log_path))
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    let log_file = open_log_file();
    let log_path = log_file.as_ref().map(|(_, path)| path.clone());
    let file_layer = log_file.map(|(file, _)| {
        tracing_subscriber::fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    // Bridge `log` records from dependencies. Must run after the subscriber is set.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to initialize log-to-tracing bridge: {}", e);
    }

    match log_path {
        Some(path) => tracing::info!("Logging initialized to: {:?}", path),
        None => tracing::info!("Logging to stdout only"),
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let crash_msg = format!(
            "awsmessaging crashed!\n\
             Panic occurred at: {}\n\
             Details: {}\n\
             Backtrace:\n{:?}\n",
            panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string()),
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic"),
            std::backtrace::Backtrace::force_capture()
        );

        eprintln!("\n{}", crash_msg);
        if let Some(log_dir) = log_dir() {
            let _ = std::fs::create_dir_all(&log_dir);
            let crash_log_path = log_dir.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&crash_log_path)
            {
                use std::io::Write;
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "\n=== CRASH at {} ===\n{}", timestamp, crash_msg);
                eprintln!("Crash log written to: {:?}", crash_log_path);
            }
        }
    }));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_panic_handler();
    init_logging();

    let args = Args::parse(std::env::args().skip(1));
    tracing::info!(
        "awsmessaging starting (commit {}, branch {}), args: {:?}",
        env!("GIT_COMMIT"),
        env!("GIT_BRANCH"),
        args
    );

    let config = MessagingConfig::load(args.config.as_deref(), args.env.as_deref())?;
    let mocking = args.mock || config.app_settings.mocking;

    let backend = if mocking {
        tracing::info!("Mocking mode: using in-memory providers");
        Backend::Mock(Arc::new(MockCloud::new(
            config.sqs.common.region.clone(),
            config.app_settings.account_id.clone(),
        )))
    } else {
        Backend::Aws(load_sdk_config(&config).await)
    };

    let context = Arc::new(ResourceContext::new());
    let manager = ApiManager::from_config(
        &config,
        Arc::clone(&context),
        &ServiceRegistry::new(),
        backend,
    )?;
    manager.preload().await;
    tracing::info!("Services ready: {:?}", manager.service_names());

    let shutdown = CancellationToken::new();
    let server = (!args.no_rest).then(|| {
        let manager = Arc::clone(&manager);
        let bind_address = config.app_settings.bind_address.clone();
        let rest_prefix = config.app_settings.rest_prefix.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            api_server::serve(manager, &bind_address, &rest_prefix, token).await
        })
    });

    match server {
        Some(mut server) => {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        tracing::error!("Could not listen for ctrl-c: {}", e);
                    }
                    tracing::info!("Shutting down");
                    shutdown.cancel();
                    if let Ok(Err(e)) = server.await {
                        tracing::error!("REST API failed during shutdown: {}", e);
                    }
                }
                joined = &mut server => match joined {
                    Ok(Ok(())) => tracing::info!("REST API exited"),
                    Ok(Err(e)) => tracing::error!("REST API failed: {}", e),
                    Err(e) => tracing::error!("REST API task panicked: {}", e),
                },
            }
        }
        None => {
            tracing::info!("REST API disabled (norest)");
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
        }
    }

    manager.dispose();
    context.dispose();
    Ok(())
}
