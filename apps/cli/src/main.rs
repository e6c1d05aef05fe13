use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use gdocs_core::bootstrap;
use indicatif::ProgressBar;
use output::{OutputFormat, StatusLine};
use progress::spinner;
use prompt::StdinPrompt;
use settings::{Overrides, Settings, SettingsSources};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod settings;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "gdocs",
    version,
    about = "Export a Google Docs document as Markdown."
)]
struct Cli {
    /// Settings file (TOML). Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// KEY=VALUE file read before environment variables.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,
    /// Do not print the M/S/E status lines on stdout.
    #[arg(long, global = true)]
    no_status: bool,
    /// Disable ANSI colors in log output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Suppress non-critical output.
    #[arg(long, global = true)]
    quiet: bool,
    /// Disable progress indicators.
    #[arg(long, global = true)]
    no_progress: bool,
    #[command(subcommand)]
    command: Option<Command>,
    /// Export arguments given without a subcommand.
    #[command(flatten)]
    export: ExportArgs,
}

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Fetch a document and print it as Markdown (the default).
    Export(ExportArgs),
    /// Run the OAuth flow and cache the token without fetching a document.
    Auth(AuthArgs),
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args, Clone, Default)]
struct AuthArgs {
    /// OAuth client secrets file.
    #[arg(long)]
    credentials: Option<PathBuf>,
    /// Cached OAuth token file.
    #[arg(long)]
    token: Option<PathBuf>,
}

#[derive(Debug, Args, Clone, Default)]
struct ExportArgs {
    /// Id of the document.
    #[arg(long, alias = "doc-id")]
    doc: Option<String>,
    /// Write the rendered document to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "markdown")]
    format: OutputFormat,
    #[command(flatten)]
    auth: AuthArgs,
}

impl Cli {
    fn progress_enabled(&self) -> bool {
        !self.quiet && !self.no_progress
    }

    fn settings(&self, auth: &AuthArgs, document_id: Option<String>) -> Result<Settings> {
        let sources = SettingsSources {
            config_file: self.config.clone(),
            env_file: Some(self.env_file.clone()),
            ..SettingsSources::default()
        };
        let overrides = Overrides {
            document_id,
            credentials_path: auth.credentials.clone(),
            token_path: auth.token.clone(),
        };
        settings::load(&sources, &overrides)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_tracing(&cli) {
        eprintln!("{error:#}");
    }

    let status = StatusLine::new(!cli.no_status);
    match run(&cli, status).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            status.failure();
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, status: StatusLine) -> Result<()> {
    match &cli.command {
        Some(Command::Completions { shell }) => {
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "gdocs", &mut std::io::stdout());
            Ok(())
        }
        Some(Command::Auth(auth)) => handle_auth(cli, auth, status).await,
        Some(Command::Export(args)) => handle_export(cli, args, status).await,
        None => handle_export(cli, &cli.export, status).await,
    }
}

async fn handle_auth(cli: &Cli, auth: &AuthArgs, status: StatusLine) -> Result<()> {
    let settings = cli.settings(auth, None)?;
    let exporter = bootstrap(settings.export_config()).await?;
    let token = exporter.authorize(&StdinPrompt::new(status)).await?;

    status.success();
    if !cli.quiet {
        match token.expiry {
            Some(expiry) => println!("Authorized; access token valid until {expiry}."),
            None => println!("Authorized."),
        }
    }
    Ok(())
}

async fn handle_export(cli: &Cli, args: &ExportArgs, status: StatusLine) -> Result<()> {
    let settings = cli.settings(&args.auth, args.doc.clone())?;
    let Some(document_id) = settings.document_id.clone() else {
        bail!("missing doc id (pass --doc, or set DOCUMENT_ID or GDOCS_DOCUMENT_ID)");
    };

    let exporter = bootstrap(settings.export_config()).await?;
    let token = exporter.authorize(&StdinPrompt::new(status)).await?;

    let spinner = spinner(
        cli.progress_enabled(),
        format!("Fetching document `{document_id}`..."),
    );
    let exported = match exporter.fetch(&document_id, &token).await {
        Ok(exported) => {
            let label = exported.title.as_deref().unwrap_or(&exported.document_id);
            finish_spinner(spinner, Some(format!("Fetched `{label}`")));
            exported
        }
        Err(error) => {
            finish_spinner(spinner, None);
            return Err(error);
        }
    };

    let body = args.format.render(&exported)?;
    deliver(&body, args.output.as_deref(), status, &mut std::io::stdout()).await
}

/// Writes the body to `output` (or `out`), reporting `S` only once the body has
/// a destination.
async fn deliver(
    body: &str,
    output: Option<&Path>,
    status: StatusLine,
    out: &mut impl Write,
) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, body.as_bytes())
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            status.write_success(out)?;
            info!(
                target: "gdocs_cli",
                path = %path.display(),
                bytes = body.len(),
                "wrote rendered document"
            );
        }
        None => {
            status.write_success(out)?;
            out.write_all(body.as_bytes())?;
            out.flush()?;
        }
    }
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let default_filter = if cli.quiet {
        "warn"
    } else {
        "info,gdocs_cli=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .with_ansi(!cli.no_color)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

fn finish_spinner(spinner: Option<ProgressBar>, message: Option<String>) {
    if let Some(progress) = spinner {
        if let Some(msg) = message {
            progress.finish_with_message(msg);
        } else {
            progress.finish_and_clear();
        }
    }
}

mod output {
    use std::io::{self, Write};

    use anyhow::Result;
    use clap::ValueEnum;
    use gdocs_core::ExportedDocument;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
    pub enum OutputFormat {
        #[default]
        Markdown,
        Json,
    }

    impl OutputFormat {
        pub fn render(self, exported: &ExportedDocument) -> Result<String> {
            match self {
                OutputFormat::Markdown => Ok(exported.markdown.clone()),
                OutputFormat::Json => {
                    let mut payload = serde_json::to_string_pretty(exported)?;
                    payload.push('\n');
                    Ok(payload)
                }
            }
        }
    }

    /// Single-letter status lines for wrappers that drive the tool as a subprocess:
    /// `M` precedes a message needing user action, `S` precedes the result, `E` marks failure.
    #[derive(Copy, Clone, Debug)]
    pub struct StatusLine {
        enabled: bool,
    }

    impl StatusLine {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn enabled(self) -> bool {
            self.enabled
        }

        pub fn message(self) {
            self.emit("M");
        }

        pub fn success(self) {
            self.emit("S");
        }

        pub fn write_success(self, out: &mut impl Write) -> io::Result<()> {
            self.write(out, "S")
        }

        pub fn failure(self) {
            self.emit("E");
        }

        fn emit(self, marker: &str) {
            let _ = self.write(&mut io::stdout().lock(), marker);
        }

        fn write(self, out: &mut impl Write, marker: &str) -> io::Result<()> {
            if self.enabled {
                writeln!(out, "{marker}")?;
                out.flush()?;
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn exported() -> ExportedDocument {
            ExportedDocument {
                document_id: "doc-1".to_string(),
                title: Some("Notes".to_string()),
                markdown: "# Notes\n- item\n".to_string(),
            }
        }

        #[test]
        fn markdown_format_is_the_raw_body() {
            assert_eq!(
                OutputFormat::Markdown.render(&exported()).unwrap(),
                "# Notes\n- item\n"
            );
        }

        #[test]
        fn disabled_status_line_writes_nothing() {
            let mut out = Vec::new();
            StatusLine::new(false).write_success(&mut out).unwrap();
            assert!(out.is_empty());
        }

        #[test]
        fn json_format_uses_camel_case_keys() {
            let rendered = OutputFormat::Json.render(&exported()).unwrap();
            let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
            assert_eq!(value["documentId"], "doc-1");
            assert_eq!(value["title"], "Notes");
            assert_eq!(value["markdown"], "# Notes\n- item\n");
        }
    }
}

mod progress {
    use std::time::Duration;

    use indicatif::{ProgressBar, ProgressStyle};

    pub fn spinner(message_enabled: bool, message: impl Into<String>) -> Option<ProgressBar> {
        if !message_enabled {
            return None;
        }
        let progress = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress.set_style(style);
        progress.set_message(message.into());
        progress.enable_steady_tick(Duration::from_millis(80));
        Some(progress)
    }
}

mod prompt {
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use gdocs_client::AuthorizationPrompt;
    use tokio::io::{stdin, AsyncBufReadExt, BufReader};

    use crate::output::StatusLine;

    /// Prints the authorization URL and reads the pasted code from stdin.
    pub struct StdinPrompt {
        status: StatusLine,
    }

    impl StdinPrompt {
        pub fn new(status: StatusLine) -> Self {
            Self { status }
        }
    }

    #[async_trait]
    impl AuthorizationPrompt for StdinPrompt {
        async fn request_code(&self, authorization_url: &str) -> Result<String> {
            if self.status.enabled() {
                self.status.message();
                println!("{authorization_url}");
            } else {
                eprintln!(
                    "Go to the following link in your browser, then type the authorization code:\n{authorization_url}"
                );
            }

            let mut line = String::new();
            let read = BufReader::new(stdin()).read_line(&mut line).await?;
            if read == 0 {
                bail!("stdin closed before an authorization code was entered");
            }
            Ok(line.trim().to_string())
        }
    }
}
