//! switchcore demo CLI
//!
//! Drives a controller against an in-memory platform from a scripted
//! sequence of switch hits, so the dispatch pipeline can be watched end to
//! end without any real hardware.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use clap::Parser;
use switchcore::{
    AppConfig, ConfigLoader, LocalClock, NoopEventSink, Platform, PlatformId, SwitchConfig,
    SwitchController,
};

#[derive(Parser)]
#[command(name = "switchcore-demo")]
#[command(about = "Run a scripted sequence of switch hits through switchcore")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file. Falls back to defaults overlaid
    /// with SWITCHCTL_* environment variables if omitted entirely.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// If `--config` is given but the file doesn't exist, fall back to
    /// defaults instead of failing. Has no effect when `--config` is omitted.
    #[arg(long)]
    allow_missing_config: bool,

    /// Dwell, in milliseconds, required before the demo's "held" handler fires.
    #[arg(long, default_value_t = 250)]
    dwell_ms: u64,
}

const DEMO_PLATFORM: PlatformId = 1;

struct DemoPlatform {
    states: RefCell<HashMap<u32, u8>>,
}

impl Platform for DemoPlatform {
    fn id(&self) -> PlatformId {
        DEMO_PLATFORM
    }

    fn read_all_states(&self) -> HashMap<u32, u8> {
        self.states.borrow().clone()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file_or_default(path, cli.allow_missing_config)?,
        None => ConfigLoader::load_from_env(Some(AppConfig::default()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .init();

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            if let Err(err) = run(&config, cli.dwell_ms).await {
                tracing::error!(error = %err, "demo run failed");
            }
        })
        .await;
    Ok(())
}

async fn run(config: &AppConfig, dwell_ms: u64) -> switchcore::SwitchResult<()> {
    let clock = Rc::new(LocalClock::new());
    let controller = SwitchController::new(clock.clone(), Rc::new(NoopEventSink));

    let platform = Rc::new(DemoPlatform {
        states: RefCell::new(HashMap::new()),
    });
    controller.register_platform(platform.clone());

    controller.register_switch(SwitchConfig::new("flipper_l", 1, DEMO_PLATFORM));
    controller.register_switch(
        SwitchConfig::new("trough_1", 2, DEMO_PLATFORM)
            .inverted(true)
            .recycle_seconds(config.default_recycle_seconds.max(0.05)),
    );

    controller.add_handler(
        "flipper_l",
        |_ctx| {
            println!("flipper_l active");
            Ok(())
        },
        1,
        0,
        false,
        serde_json::Value::Null,
    )?;

    controller.add_handler(
        "trough_1",
        |_ctx| {
            println!("trough_1 settled");
            Ok(())
        },
        1,
        dwell_ms,
        false,
        serde_json::Value::Null,
    )?;

    controller.add_monitor(Rc::new(|change: &switchcore::MonitoredChange| {
        println!("monitor: {} -> {}", change.name, change.new_state);
    }));

    println!("hitting flipper_l");
    controller.process_switch("flipper_l", 1, false)?;

    println!("hitting trough_1 (NC, physical low)");
    controller.process_switch("trough_1", 0, false)?;

    tokio::time::sleep(std::time::Duration::from_millis(dwell_ms + 50)).await;
    controller.tick()?;

    println!("active: flipper_l={}", controller.is_active("flipper_l", 0)?);
    println!("active: trough_1={}", controller.is_active("trough_1", 0)?);

    Ok(())
}
