//! Detection AI CLI

use clap::{ArgAction, Parser};
use console::style;
use detection_core::{
    load, resolve, scrub_secret, Credential, DetectionConfig, DetectionError, API_KEY_ENV,
    DEFAULT_DEV_FILE,
};
use detection_gemini::{
    build_detection_prompt, ClientConfig, Dispatcher, Feedback, GeminiClient, TextGenerator,
    DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, KNOWN_MODELS,
};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::ExposeSecret;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const RULE: &str = "============================================================";

#[derive(Parser)]
#[command(name = "detection-ai")]
#[command(about = "Get AI-powered feedback for cybersecurity detection improvement using a YAML config file")]
#[command(version)]
struct Cli {
    /// Path to the YAML file containing detection parameters
    #[arg(long, value_name = "PATH")]
    yaml_file: PathBuf,

    /// Gemini API key (overrides the GEMINI_API_KEY environment variable)
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Gemini model to use
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Local developer settings file checked when no key is set otherwise
    #[arg(long, value_name = "PATH", default_value = DEFAULT_DEV_FILE)]
    env_file: PathBuf,

    /// API root to send requests to
    #[arg(long, value_name = "URL", env = "DETECTION_AI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Request timeout in seconds
    #[arg(
        long,
        value_name = "SECS",
        env = "DETECTION_AI_TIMEOUT_SECONDS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Print the generated prompt before sending it
    #[arg(long)]
    show_prompt: bool,

    /// Print only the feedback text
    #[arg(short, long, conflicts_with = "json")]
    quiet: bool,

    /// Print the result as a JSON object
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Full,
    Quiet,
    Json,
}

impl From<&Cli> for OutputMode {
    fn from(cli: &Cli) -> Self {
        if cli.json {
            OutputMode::Json
        } else if cli.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Full
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut credential = None;
    match run(&cli, &mut credential).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut secrets: Vec<&str> = cli.api_key.iter().map(String::as_str).collect();
            if let Some(c) = &credential {
                secrets.push(c.expose_secret());
            }
            report_error(&err, &secrets);
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("DETECTION_AI_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,detection_ai={level},detection_core={level},detection_gemini={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Loader, then resolver, then dispatcher
///
/// The resolved credential is handed back through `credential` so the caller
/// can scrub it from any error it prints.
async fn run(cli: &Cli, credential: &mut Option<Credential>) -> detection_core::Result<()> {
    let mode = OutputMode::from(cli);

    let config = load(&cli.yaml_file)?;

    let client_config = ClientConfig {
        base_url: cli.base_url.clone(),
        model: cli.model.clone(),
        timeout: Duration::from_secs(cli.timeout),
    };
    let dispatcher = Dispatcher::new(GeminiClient::new(client_config)?);
    let model = dispatcher.generator().model().to_string();

    let env_value = std::env::var(API_KEY_ENV).ok();
    let credential = credential.insert(resolve(
        cli.api_key.as_deref(),
        env_value.as_deref(),
        Some(&cli.env_file),
    )?);
    debug!(source = %credential.source(), "Using API key");

    if mode == OutputMode::Full {
        print_summary(&config, &model);
        if cli.show_prompt {
            println!("\n{}", style("📤 Generated Prompt:").bold());
            println!("{}", "-".repeat(40));
            println!("{}", build_detection_prompt(&config));
            println!("{}", "-".repeat(40));
        }
    }

    let spinner = (mode == OutputMode::Full).then(|| waiting_spinner(&model));
    let result = dispatcher.dispatch(&config, credential).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let feedback = result?;

    match mode {
        OutputMode::Full => print_feedback(&feedback),
        OutputMode::Quiet => {
            if feedback.is_truncated() {
                eprintln!("warning: the response hit the model's output limit");
            }
            println!("{}", feedback.text);
        }
        OutputMode::Json => print_json(&config, &feedback),
    }

    Ok(())
}

fn print_summary(config: &DetectionConfig, model: &str) {
    println!(
        "{}",
        style("🔒 Cybersecurity Detection Framework - AI Feedback Generator")
            .bold()
            .cyan()
    );
    println!("{RULE}");
    println!("📋 Detection Title: {}", config.title());
    println!("📝 Description: {}", config.description());
    println!("🔍 Source Table: {}", config.source_table());
    println!("💻 SQL Search: {}", config.sql_search());
    println!("{RULE}");
    println!("\n🤖 Sending prompt to '{}' for AI feedback...", style(model).green());
}

fn waiting_spinner(model: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(format!("Waiting for {model}..."));
    pb.tick();
    pb
}

fn print_feedback(feedback: &Feedback) {
    println!(
        "\n{}",
        style("🎯 AI Feedback for Detection Improvement:").bold().green()
    );
    println!("{RULE}");
    println!("{}", feedback.text);
    println!("{RULE}");
    if feedback.is_truncated() {
        println!(
            "{}",
            style("⚠️  The response hit the model's output limit and may be cut off.").yellow()
        );
    }

    if let Some(usage) = feedback.usage {
        println!(
            "\n📊 Token Usage: {} prompt tokens, {} response tokens",
            usage.prompt_tokens, usage.response_tokens
        );
    }
}

fn print_json(config: &DetectionConfig, feedback: &Feedback) {
    let out = json!({
        "model": feedback.model,
        "title": config.title(),
        "feedback": feedback.text,
        "usage": feedback.usage,
        "truncated": feedback.is_truncated(),
    });
    println!("{out:#}");
}

fn report_error(err: &DetectionError, secrets: &[&str]) {
    let mut message = err.to_string();
    for secret in secrets {
        message = scrub_secret(&message, secret);
    }

    eprintln!("{} {}", style("Error:").red().bold(), message);
    for line in hints(err) {
        eprintln!("  {}", style(line).dim());
    }
}

/// Remediation lines shown under an error
fn hints(err: &DetectionError) -> Vec<String> {
    match err {
        DetectionError::MissingCredential | DetectionError::InvalidCredentialFormat(_) => vec![
            "Please set your Gemini API key:".to_string(),
            "1. Get your API key from https://aistudio.google.com/app/apikey".to_string(),
            format!("2. Set it as an environment variable: export {API_KEY_ENV}='your-api-key-here'"),
            format!("3. Or create a .env file with: {API_KEY_ENV}=your-api-key-here"),
            "4. Or pass it directly: --api-key your-api-key-here".to_string(),
        ],
        DetectionError::Schema { .. } => vec![
            "Please ensure your YAML file contains all required fields:".to_string(),
            "- title: Detection rule title".to_string(),
            "- description: What the detection is looking for".to_string(),
            "- sql_search: The SQL search query".to_string(),
            "- source_table: The source log table to search".to_string(),
        ],
        DetectionError::InvalidModel(_) => {
            vec![format!("Model names look like: {}", KNOWN_MODELS.join(", "))]
        }
        DetectionError::RemoteService {
            status: Some(404), ..
        } => vec![format!("Available models: {}", KNOWN_MODELS.join(", "))],
        DetectionError::Authentication => vec![
            "Check that the API key is active and allowed to use the Generative Language API."
                .to_string(),
        ],
        DetectionError::Network(_) => vec![
            "Please check your internet connection, or raise --timeout for slow responses."
                .to_string(),
        ],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn output_mode_prefers_json() {
        let cli = Cli::parse_from(["detection-ai", "--yaml-file", "d.yml", "--json"]);
        assert_eq!(OutputMode::from(&cli), OutputMode::Json);

        let cli = Cli::parse_from(["detection-ai", "--yaml-file", "d.yml", "-q"]);
        assert_eq!(OutputMode::from(&cli), OutputMode::Quiet);
    }

    #[test]
    fn defaults_match_public_endpoint() {
        let cli = Cli::parse_from(["detection-ai", "--yaml-file", "d.yml"]);
        assert_eq!(cli.model, "gemini-1.5-flash");
        assert_eq!(cli.env_file, PathBuf::from(".env"));
        assert!(cli.api_key.is_none());
    }

    #[test]
    fn credential_errors_explain_every_source() {
        let lines = hints(&DetectionError::MissingCredential).join("\n");
        assert!(lines.contains("export GEMINI_API_KEY"));
        assert!(lines.contains(".env"));
        assert!(lines.contains("--api-key"));
    }
}
