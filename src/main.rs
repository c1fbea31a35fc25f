//! Binary entry point: CLI, logging, the accessibility trust check, and the
//! platform wiring around the engine.

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Screen reader: navigate the accessibility tree of the focused application
/// with CapsLock chords and hear the focused element described.
#[derive(Debug, Parser)]
#[command(name = "outloud", version, about)]
struct Cli {
    /// Deadline for accessibility round-trips, in seconds.
    #[arg(long, default_value_t = 5.0)]
    timeout: f32,

    /// Directory element dumps are written to.
    #[arg(long, env = "OUTLOUD_DUMP_DIR")]
    dump_dir: Option<std::path::PathBuf>,

    /// Start with browse mode enabled.
    #[arg(long)]
    browse: bool,

    /// Log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "outloud=info",
        1 => "outloud=debug",
        _ => "outloud=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn engine_config(cli: &Cli) -> outloud::EngineConfig {
    let mut config = outloud::EngineConfig {
        element_timeout_secs: cli.timeout,
        browse_mode_at_startup: cli.browse,
        ..outloud::EngineConfig::default()
    };
    if let Some(dir) = &cli.dump_dir {
        config.dump_dir = dir.clone();
    }
    config
}

#[cfg(target_os = "macos")]
mod sig {
    use cidre::cf;

    const SIGINT: i32 = 2;

    extern "C" {
        fn signal(signum: i32, handler: extern "C" fn(i32)) -> usize;
    }

    extern "C" fn stop_main_run_loop(_signum: i32) {
        cf::RunLoop::main().stop();
    }

    /// Stop the main run loop on Ctrl-C so shutdown can join the workers.
    pub fn install_sigint_handler() {
        unsafe {
            signal(SIGINT, stop_main_run_loop);
        }
    }
}

#[cfg(target_os = "macos")]
fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use outloud::gateway::macos::MacGateway;
    use outloud::gateway::Gateway;
    use outloud::input::macos::{spawn_event_tap, MacKeyState, MacLockState};
    use outloud::speech::macos::SayDevice;
    use outloud::{Agent, Scheduler};
    use tracing::info;

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = engine_config(&cli);

    let gw = Arc::new(MacGateway::new());

    // Prompt for the accessibility-client privilege; without it there is
    // nothing this process can do.
    if !gw.confirm_trusted() {
        eprintln!("outloud: accessibility permission denied; grant it in System Settings");
        std::process::exit(2);
    }

    let (device, completion) = SayDevice::new();
    let scheduler = Scheduler::new(Box::new(device));
    completion.attach(scheduler.clone());

    let agent = Agent::new(
        gw,
        scheduler,
        Arc::new(MacKeyState),
        Box::new(MacLockState::open()?),
        &config,
    )?;

    // Target whatever is frontmost now, then follow activation changes.
    let workspace = outloud::gateway::macos::FrontmostWatcher::new();
    if let Some(pid) = workspace.current_pid() {
        agent.frontmost_changed(pid);
    }
    workspace.watch({
        let commands = agent.commands();
        move |pid| {
            let _ = commands.send(outloud::Command::Refocus { pid });
        }
    });

    spawn_event_tap(agent.dispatcher())?;
    sig::install_sigint_handler();

    info!("outloud running; hold CapsLock and press Tab to read the focus");
    cidre::cf::RunLoop::run();

    info!("run loop stopped; shutting down");
    agent.shutdown();
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let _ = engine_config(&cli);
    eprintln!("outloud: the OS accessibility backend is only available on macOS");
    std::process::exit(1);
}
