mod app;
mod theme;
mod ui;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use counter_dash::api;
use counter_dash::frames::{frame_client, run_frame_loader};
use counter_dash::http::ReqwestClient;
use counter_dash::stats_poller::StatsPoller;
use counter_dash::stream_monitor::StreamMonitor;
use counter_proto::config::Config;
use counter_proto::session::{AuthTokenProvider, FileTokenStore, StaticToken};

#[derive(Parser, Debug)]
#[command(
    name = "counter-dash",
    version,
    about = "Terminal dashboard for the visitor counter"
)]
struct Cli {
    /// API base URL (overrides config and COUNTER_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Edge stream base URL (overrides config and COUNTER_STREAM_BASE)
    #[arg(long, global = true)]
    stream_base: Option<String>,

    /// Use this bearer token instead of the saved session
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Live dashboard (default)
    Dashboard {
        /// Day to show, YYYY-MM-DD (default: today)
        #[arg(long)]
        day: Option<NaiveDate>,
    },
    /// Log in and save the session token
    Login {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Forget the saved session token
    Logout,
    /// Show or change the camera config
    Camera {
        /// Camera id (default: from config)
        #[arg(long)]
        id: Option<i64>,
        #[command(subcommand)]
        action: CameraCommand,
    },
    /// Export the CSV report for a date range
    Report {
        #[arg(long)]
        from: NaiveDate,
        /// Defaults to `from`
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum CameraCommand {
    Show,
    /// Omitted fields keep their current value; an empty string clears it
    Set {
        #[arg(long)]
        rtsp_url: Option<String>,
        /// ROI polygon as JSON, e.g. [[100,100],[500,100],[500,400],[100,400]]
        #[arg(long)]
        roi: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = counter_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let log_path = data_dir.join("dash.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // The terminal belongs to the TUI, so everything goes to the log file.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,counter_dash=debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string()
    });
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();
    eprintln!("counter-dash log: {}", log_path.display());
    tracing::info!("counter-dash starting");

    let mut config = Config::load().context("Failed to load config")?;
    if let Some(base) = cli.api_base {
        config.api.base_url = base;
    }
    if let Some(base) = cli.stream_base {
        config.stream.base_url = base;
    }

    let store = FileTokenStore::new(config.session.token_file.clone());
    let tokens: Arc<dyn AuthTokenProvider> = match cli.token {
        Some(t) => Arc::new(StaticToken(Some(t))),
        None => Arc::new(store.clone()),
    };
    let api_client = Arc::new(ReqwestClient::new(
        config.api.base_url.clone(),
        config.api.request_timeout(),
    )?);

    match cli.command.unwrap_or(Commands::Dashboard { day: None }) {
        Commands::Dashboard { day } => {
            let day = day.unwrap_or_else(|| Local::now().date_naive());
            run_dashboard(&config, tokens, api_client, day).await?;
        }
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            api::login(api_client.as_ref(), &store, &username, &password).await?;
            println!("Logged in as {}", username);
        }
        Commands::Logout => {
            store.clear()?;
            println!("Logged out");
        }
        Commands::Camera { id, action } => {
            let id = id.unwrap_or(config.camera.id);
            let camera = api::fetch_camera(api_client.as_ref(), tokens.as_ref(), id).await?;
            match action {
                CameraCommand::Show => {
                    println!("Camera {}: {}", camera.id, camera.name);
                    println!("  rtsp_url: {}", camera.rtsp_url.as_deref().unwrap_or("-"));
                    match camera.roi_polygon() {
                        Ok(Some(poly)) => println!("  roi: {}", poly.to_json()),
                        Ok(None) => println!("  roi: -"),
                        Err(e) => println!("  roi: invalid ({})", e),
                    }
                }
                CameraCommand::Set { rtsp_url, roi } => {
                    let roi_text = api::roi_text_for_update(&camera, roi.as_deref())?;
                    let rtsp_url = rtsp_url
                        .or(camera.rtsp_url)
                        .unwrap_or_default();
                    let saved = api::update_camera(
                        api_client.as_ref(),
                        tokens.as_ref(),
                        id,
                        &rtsp_url,
                        &roi_text,
                    )
                    .await?;
                    println!("Saved camera {}", saved.id);
                }
            }
        }
        Commands::Report { from, to, out } => {
            let to = to.unwrap_or(from);
            let path =
                api::fetch_report(api_client.as_ref(), tokens.as_ref(), from, to, &out).await?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

async fn run_dashboard(
    config: &Config,
    tokens: Arc<dyn AuthTokenProvider>,
    api_client: Arc<ReqwestClient>,
    day: NaiveDate,
) -> anyhow::Result<()> {
    let stream_client = Arc::new(ReqwestClient::new(
        config.stream.base_url.clone(),
        config.api.request_timeout(),
    )?);

    let poller = StatsPoller::new(tokens, api_client, day, config.polling.discard_stale_cycles);
    let monitor = StreamMonitor::new(
        stream_client,
        config.stream.health_url(),
        config.stream.feed_url(),
    );

    let stats_task = poller.activate(config.polling.stats_interval());
    let health_task = monitor.activate(config.polling.health_interval());
    let loader = tokio::spawn(run_frame_loader(
        monitor.clone(),
        frame_client(config.api.request_timeout())?,
    ));

    let report_url = api::report_url(&config.api.base_url, day, day);
    let app = app::App::new(
        poller.clone(),
        monitor.clone(),
        report_url,
        config.polling.stats_interval().as_secs(),
    );
    let result = app.run().await;

    // Normally done by the app on quit; also covers a failed terminal setup.
    if poller.is_active() {
        poller.deactivate();
    }
    if monitor.is_active() {
        monitor.deactivate();
    }
    let _ = tokio::join!(stats_task, health_task, loader);
    result
}

fn read_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
