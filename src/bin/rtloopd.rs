//! rtloopd - real-time control loop daemon
//!
//! Runs a periodic control loop at real-time priority under an overtime
//! watchdog, with single-instance start/stop/status control.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (forks to background)
//! rtloopd start -d /dev/ttyACM0 -d2 /dev/ttyS2
//!
//! # Start in the foreground
//! rtloopd start --foreground
//!
//! # Ask the daemon to stop
//! rtloopd stop
//!
//! # Check daemon status
//! rtloopd status
//! ```

use std::env;
use std::fs::{self, File};
use std::process;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rtloop_core::{Config, DaemonStatus};
use rtloopd::board::Board;
use rtloopd::cli::{parse_invocation, usage, Invocation, StartOptions};
use rtloopd::controller::DaemonController;
use rtloopd::drivers::HeartbeatLoop;
use rtloopd::error::{ControlError, UsageError};
use rtloopd::monitor::{spawn_monitor_task, StatusPublisher};
use rtloopd::priority::{FifoPriorityController, PriorityController};
use rtloopd::rundir::RunDir;
use rtloopd::watchdog::WatchdogTimer;

fn main() -> Result<()> {
    let invocation = match parse_invocation(env::args_os()) {
        Ok(invocation) => invocation,
        Err(UsageError::HelpRequested(text)) => {
            print!("{text}");
            process::exit(0);
        }
        Err(e) => {
            println!("rtloopd: {e}");
            println!("{}", usage());
            process::exit(e.exit_code());
        }
    };

    let run_dir = RunDir::from_env();

    match invocation {
        Invocation::Start(options) => start(&run_dir, options),
        Invocation::Stop => {
            stop(&run_dir);
            Ok(())
        }
        Invocation::Status => {
            status(&run_dir);
            Ok(())
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn start(run_dir: &RunDir, options: StartOptions) -> Result<()> {
    // Held from before the fork until the daemon has cleaned up
    let lock = match run_dir.acquire_pid_lock() {
        Ok(lock) => lock,
        Err(ControlError::AlreadyRunning) => {
            match run_dir.read_pid() {
                Some(pid) => println!("rtloopd already running (PID {pid})"),
                None => println!("rtloopd already running"),
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to lock PID file"),
    };

    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            run_dir.remove_files();
            return Err(e);
        }
    };

    println!("Starting rtloopd {}", config.devices.banner());

    if !options.foreground {
        daemonize(run_dir)?;
        lock.record(process::id())
            .context("Failed to record daemon PID")?;
    }

    let result = run_daemon(config, run_dir.clone());

    run_dir.remove_files();
    drop(lock);

    result
}

fn load_config(options: &StartOptions) -> Result<Config> {
    let mut config = Config::load_default().context("Failed to load configuration")?;
    options.devices.apply_to(&mut config.devices);
    Ok(config)
}

fn stop(run_dir: &RunDir) {
    match run_dir.request_stop() {
        Ok(Some(pid)) => println!("Stopping rtloopd (PID {pid})"),
        Ok(None) => println!("\trtloopd is {}", DaemonStatus::NotStarted),
        Err(e) => println!("rtloopd: {e}"),
    }
}

fn status(run_dir: &RunDir) {
    let report = run_dir.query_status();
    println!("\trtloopd is {}", report.status);

    if let Some(snapshot) = report.snapshot {
        let stats = snapshot.loop_stats;
        let priority = snapshot
            .priority
            .map_or_else(|| "unknown".to_string(), |level| level.to_string());
        println!("\tpid {}, priority {priority}", snapshot.pid);
        println!(
            "\titerations {}, overruns {} ({:.1}%), scheduling failures {}",
            stats.iterations,
            stats.overruns,
            stats.overrun_ratio() * 100.0,
            stats.scheduling_failures
        );
        println!(
            "\titeration time last {}us, max {}us, mean {}us",
            stats.last_iteration_us, stats.max_iteration_us, stats.mean_iteration_us
        );
        println!(
            "\tcpu {:.1}%, memory {} MB, up since {}",
            snapshot.cpu_percent,
            snapshot.memory_mb,
            snapshot.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

fn daemonize(run_dir: &RunDir) -> Result<()> {
    use daemonize::Daemonize;

    fs::create_dir_all(run_dir.path()).context("Failed to create state directory")?;

    let log_path = run_dir.log_file();
    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

// ============================================================================
// Daemon Process
// ============================================================================

#[tokio::main]
async fn run_daemon(config: Config, run_dir: RunDir) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rtloopd=info".parse()?)
                .add_directive("rtloop_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        run_dir = %run_dir.path().display(),
        "rtloopd starting"
    );

    // Overtime timers must preempt a worker spinning at main priority
    let timer = WatchdogTimer::spawn(config.priority.watchdog)
        .context("Failed to start watchdog timer")?;

    let priority: Arc<dyn PriorityController> =
        Arc::new(FifoPriorityController::new(config.priority));
    let controller = Arc::new(DaemonController::new(
        config.clone(),
        Arc::clone(&priority),
        timer.handle(),
    ));

    let cancel_token = CancellationToken::new();
    let publish_now = Arc::new(Notify::new());
    let publisher = StatusPublisher::new(
        run_dir,
        Arc::clone(controller.shared()),
        Arc::clone(&priority),
    );
    let monitor = spawn_monitor_task(
        publisher,
        config.monitor.status_interval(),
        Arc::clone(&publish_now),
        cancel_token.clone(),
    );

    controller
        .start(
            &config.devices,
            Board::standard(),
            Box::new(HeartbeatLoop::new()),
        )
        .context("Failed to start worker")?;
    publish_now.notify_one();

    let joiner = Arc::clone(&controller);
    let mut worker = tokio::task::spawn_blocking(move || joiner.join());

    let signalled = tokio::select! {
        result = wait_for_shutdown_signal() => {
            if let Err(e) = result {
                error!(error = %e, "Error waiting for shutdown signal");
            }
            true
        }
        joined = &mut worker => {
            report_worker_exit(joined);
            false
        }
    };

    if signalled {
        controller.stop();
        publish_now.notify_one();
        info!("Waiting for worker to leave its loop");
        report_worker_exit(worker.await);
    }

    cancel_token.cancel();
    if let Err(e) = monitor.await {
        warn!(error = %e, "Monitor task failed");
    }
    drop(timer);

    info!("rtloopd stopped");
    Ok(())
}

fn report_worker_exit(
    joined: Result<Option<thread::Result<()>>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Some(Ok(()))) => info!("Worker joined"),
        Ok(Some(Err(_))) => error!("Worker panicked"),
        Ok(None) => warn!("Worker was already joined"),
        Err(e) => error!(error = %e, "Failed to join worker"),
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
