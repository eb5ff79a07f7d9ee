use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod conversation;
mod handler;
mod highlight;
mod markup;
mod persona;
mod spark;
mod stream;
mod tui;
mod ui;

use app::App;
use config::Config;
use conversation::Role;
use spark::SparkClient;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "smitty")]
#[command(about = "Terminal chat client with a persistent persona")]
struct Args {
    /// Chat gateway base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name to request
    #[arg(short, long)]
    model: Option<String>,

    /// Where Ctrl+E writes the HTML transcript
    #[arg(short, long)]
    transcript: Option<std::path::PathBuf>,
}

/// Log to a file; stderr belongs to the terminal UI.
fn init_logging() {
    let log_path = dirs::config_dir()
        .map(|d| d.join("smitty"))
        .unwrap_or_else(std::env::temp_dir);
    if std::fs::create_dir_all(&log_path).is_err() {
        return;
    }
    let Ok(file) = std::fs::File::create(log_path.join("smitty.log")) else {
        return;
    };

    let filter = EnvFilter::try_from_env("SMITTY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Arc::new(file))
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "config was unreadable, using defaults");
        Config::new()
    });

    let endpoint = args
        .endpoint
        .unwrap_or_else(|| config.endpoint().to_string());
    let model = args.model.unwrap_or_else(|| config.model().to_string());
    let transcript_path = args
        .transcript
        .or_else(|| config.transcript_path.as_ref().map(Into::into))
        .unwrap_or_else(|| std::env::temp_dir().join("smitty-transcript.html"));

    // Write the resolved settings back so the first run seeds the file.
    let saved = Config {
        endpoint: Some(endpoint.clone()),
        model: Some(model.clone()),
        transcript_path: Some(transcript_path.display().to_string()),
    };
    if let Err(err) = saved.save() {
        tracing::warn!(error = %err, "could not write config");
    }

    let (client_tx, mut client_rx) = mpsc::unbounded_channel();
    let spark = SparkClient::new(&endpoint, &model, client_tx.clone());
    let mut app = App::new(spark.clone(), client_tx, transcript_path);

    let reachable = spark.connect(true).await?;
    if !reachable {
        app.conversation.append(
            Role::System,
            "Could not reach the chat gateway. Check the endpoint and try again.",
        )?;
    }
    app.conversation
        .append(Role::Assistant, "你好，我是**Smitty**！有什么可以帮你的吗？")?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(app::TICK_INTERVAL);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        tokio::select! {
            event = events.next() => {
                match event {
                    Some(event) => handler::handle_event(&mut app, event)?,
                    None => break,
                }
            }
            client_event = client_rx.recv() => {
                if let Some(client_event) = client_event {
                    app.on_client_event(client_event)?;
                }
            }
        }
    }

    tui::restore()?;
    Ok(())
}
