use anyhow::{anyhow, bail, Context};
use futures::StreamExt;
use sleuth::cli::init::{self, InitConfig, InitResult};
use sleuth::cli::output::Output;
use sleuth::cli::{Cli, Commands};
use sleuth::utils::logging::init_tracing;
use sleuth::utils::toml_config::{ProviderConfig, SleuthConfig};
use sleuth::{ProviderRegistry, ResearchCoordinator, ResearchEvent, ResearchQuery, WebCapabilities};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Commands::Init {
            path,
            force,
            provider,
        } => match init::run(
            InitConfig {
                path,
                force,
                provider,
            },
            &output,
        ) {
            InitResult::Success | InitResult::AlreadyExists => Ok(()),
            InitResult::Error(e) => Err(anyhow!(e)),
        },
        Commands::Config { validate } => show_config(&cli.config, validate, &output),
        Commands::Research { query, sse, links } => {
            research(&cli.config, query.join(" "), sse, links, cli.verbose, &output).await
        }
    }
}

async fn research(
    config_path: &Path,
    query: String,
    sse: bool,
    links: bool,
    verbose: bool,
    output: &Output,
) -> anyhow::Result<()> {
    let config = SleuthConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    init_tracing(&config.logging, verbose)?;

    let clients = ProviderRegistry::from_config(&config).research_clients(&config.research)?;
    let coordinator = ResearchCoordinator::new(clients, web_capabilities()?, config.research.settings());

    let cancel = CancellationToken::new();
    let mut events = coordinator.stream_with_cancel(ResearchQuery::new(query), cancel.clone());
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                if let ResearchEvent::Error { kind, .. } = &event {
                    outcome = Err(anyhow!("research run failed ({})", kind));
                }
                if sse {
                    print!("{}", event.to_sse());
                    continue;
                }
                match event {
                    ResearchEvent::FinalReport { report_text, bibliography } => {
                        let text = if links {
                            bibliography.render_links(&report_text)
                        } else {
                            report_text
                        };
                        output.report(&text, &bibliography);
                    }
                    ResearchEvent::Error { message, .. } => output.error(&message),
                    other => output.event(&other),
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                output.warning("Cancelling research run...");
                cancel.cancel();
            }
        }
    }

    outcome
}

#[cfg(feature = "daedra")]
fn web_capabilities() -> anyhow::Result<Arc<dyn WebCapabilities>> {
    Ok(Arc::new(sleuth::DaedraCapabilities::new()))
}

#[cfg(not(feature = "daedra"))]
fn web_capabilities() -> anyhow::Result<Arc<dyn WebCapabilities>> {
    bail!("sleuth was built without a web backend; enable the `daedra` feature")
}

fn show_config(path: &Path, validate: bool, output: &Output) -> anyhow::Result<()> {
    let config = SleuthConfig::load_unchecked(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv(
        "logging",
        &format!("{} ({:?})", config.logging.level, config.logging.format).to_lowercase(),
    );

    output.header("Providers");
    let mut providers: Vec<_> = config.providers.iter().collect();
    providers.sort_by_key(|(name, _)| name.as_str());
    for (name, provider) in providers {
        let detail = match provider {
            ProviderConfig::Ollama { base_url } => format!("ollama at {}", base_url),
            ProviderConfig::OpenAI {
                api_base,
                api_key_env,
            } => format!("openai at {} (key from ${})", api_base, api_key_env),
        };
        output.list_item(&format!("{}: {}", name, detail));
    }

    output.header("Models");
    let mut models: Vec<_> = config.models.iter().collect();
    models.sort_by_key(|(name, _)| name.as_str());
    for (name, model) in models {
        output.list_item(&format!("{}: {} via {}", name, model.model, model.provider));
    }

    let research = &config.research;
    let settings = research.settings();
    output.header("Research");
    output.kv("lead model", &research.lead_model);
    output.kv("worker model", &research.worker_model);
    output.kv("citation model", research.citation_model());
    output.kv("max sub-tasks", &settings.max_subtasks.to_string());
    output.kv("concurrency", &settings.concurrency.to_string());
    output.kv("worker timeout", &format!("{}s", settings.worker_timeout.as_secs()));
    output.kv("tool calls per worker", &settings.max_tool_calls.to_string());

    if validate {
        match config.validate_with_warnings() {
            Ok(warnings) => {
                for warning in &warnings {
                    output.warning(&warning.message);
                }
                output.success("Configuration is valid");
            }
            Err(e) => {
                output.error(&e.to_string());
                bail!("invalid configuration");
            }
        }
    }
    Ok(())
}
