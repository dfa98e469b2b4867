use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use escrow_stepper::api::BackendClient;
use escrow_stepper::config::Config;
use escrow_stepper::flows::{FlowDefinition, FlowRegistry};
use escrow_stepper::logging;
use escrow_stepper::rest::{self, ApiState, SandboxServer};
use escrow_stepper::runner::{self, AnswerSheet};
use escrow_stepper::wizard::{
    Collaborators, CompositeValidator, EngineContext, EngineSettings, HistoryNavigator,
    RuleValidator, SessionSeed, StepKind, StepperEngine, WizardRoute,
};

#[derive(Parser)]
#[command(name = "escrow-stepper")]
#[command(about = "Multi-step entity wizards for the escrow back-office console")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the in-memory sandbox backend
    Serve {
        /// Port to listen on (default: sandbox.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available flows
    Flows,

    /// Show the steps and fields of a flow
    Flow {
        /// Flow key (e.g., escrow_account)
        key: String,
    },

    /// Parse a wizard URL
    Route {
        /// Path or absolute URL, e.g. /fees/42/step/2?editing=true
        url: String,
    },

    /// Drive a flow through the backend using prepared answers
    Run {
        /// Flow key
        flow: String,

        /// JSON or YAML file of field values per step
        #[arg(short, long)]
        answers: PathBuf,

        /// Resume from a wizard URL instead of starting a fresh entry
        #[arg(long)]
        url: Option<String>,

        /// Start an embedded sandbox and run against it
        #[arg(long)]
        sandbox: bool,

        /// Locale sent to the backend
        #[arg(long, default_value = "en")]
        locale: String,

        /// Also ask the backend to validate each step
        #[arg(long)]
        remote_validation: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let _logging_handle = logging::init_logging(&config, cli.debug)?;

    match cli.command {
        Commands::Serve { port } => cmd_serve(&config, port).await?,
        Commands::Flows => cmd_flows(&config)?,
        Commands::Flow { key } => cmd_flow(&config, &key)?,
        Commands::Route { url } => cmd_route(&url)?,
        Commands::Run {
            flow,
            answers,
            url,
            sandbox,
            locale,
            remote_validation,
        } => {
            cmd_run(
                &config,
                RunArgs {
                    flow,
                    answers,
                    url,
                    sandbox,
                    locale,
                    remote_validation,
                },
            )
            .await?
        }
    }

    Ok(())
}

fn load_flows(config: &Config) -> Result<FlowRegistry> {
    FlowRegistry::load(&config.flows_path())
}

fn find_flow<'a>(registry: &'a FlowRegistry, key: &str) -> Result<&'a FlowDefinition> {
    registry.get(key).with_context(|| {
        let known: Vec<&str> = registry.all().map(|f| f.key.as_str()).collect();
        format!("Unknown flow '{}' (available: {})", key, known.join(", "))
    })
}

async fn cmd_serve(config: &Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.sandbox.port);
    let flows = load_flows(config)?;

    println!("Starting sandbox backend...");
    println!("  Port:  {}", port);
    println!("  Flows: {}", flows.len());
    println!("  Endpoints:");
    println!("    GET  /api/v1/health");
    println!("    GET  /api/v1/flows");
    println!("    POST /api/v1/{{collection}}/steps/{{n}}");
    println!("    PUT  /api/v1/{{collection}}/{{id}}/steps/{{n}}");
    println!("    GET  /api/v1/{{collection}}/{{id}}");
    println!("    POST /api/v1/{{collection}}/steps/{{n}}/validate");
    println!("    POST /api/v1/workflow/requests");
    println!();

    rest::serve(ApiState::new(flows), port).await
}

fn cmd_flows(config: &Config) -> Result<()> {
    let flows = load_flows(config)?;

    println!("Flows ({})", flows.len());
    println!("{}", "─".repeat(60));
    for flow in flows.all() {
        println!(
            "{:<22} {:<26} {} steps, {} fields  [{:?}]",
            flow.key,
            flow.collection,
            flow.steps.len(),
            flow.field_count(),
            flow.source
        );
    }

    Ok(())
}

fn cmd_flow(config: &Config, key: &str) -> Result<()> {
    let flows = load_flows(config)?;
    let flow = find_flow(&flows, key)?;

    println!("{} ({})", flow.name, flow.key);
    if !flow.description.is_empty() {
        println!("{}", flow.description);
    }
    println!("Collection: /{}", flow.collection);
    println!(
        "On completion: {} / {} / {}",
        flow.module_name, flow.reference_type, flow.action_key
    );
    println!("{}", "─".repeat(60));

    for (index, step) in flow.steps.iter().enumerate() {
        let kind = match step.kind {
            StepKind::Form => "form",
            StepKind::OptionalUpload => "optional upload",
            StepKind::Review => "review",
        };
        println!("{}. {} ({})", index + 1, step.label, kind);
        for field in &step.fields {
            let mut notes = Vec::new();
            if field.rules.required {
                notes.push("required".to_string());
            }
            if step.excluded_fields.contains(&field.name) {
                notes.push("cross-field".to_string());
            }
            if let Some(pattern) = &field.rules.pattern {
                notes.push(format!("pattern {}", pattern));
            }
            if !field.rules.one_of.is_empty() {
                notes.push(format!("one of {}", field.rules.one_of.join("|")));
            }
            println!("     {:<22} {}", field.display_name(), notes.join(", "));
        }
    }

    Ok(())
}

fn cmd_route(url: &str) -> Result<()> {
    let route = WizardRoute::parse(url)?;

    println!("Collection: {}", route.collection);
    println!(
        "Entity:     {}",
        route
            .entity_id
            .as_ref()
            .map_or("(new)".to_string(), ToString::to_string)
    );
    println!("Step:       {} (index {})", route.step_number, route.step_index());
    println!("Mode:       {}", route.mode);
    println!("Canonical:  {}", route);

    Ok(())
}

struct RunArgs {
    flow: String,
    answers: PathBuf,
    url: Option<String>,
    sandbox: bool,
    locale: String,
    remote_validation: bool,
}

async fn cmd_run(config: &Config, args: RunArgs) -> Result<()> {
    let flows = load_flows(config)?;
    let definition = find_flow(&flows, &args.flow)?.clone();
    let answers = AnswerSheet::load(&args.answers)?;
    answers.check_against(&definition)?;

    let mut backend = config.backend.clone();
    let sandbox = if args.sandbox {
        let server = SandboxServer::spawn_local(ApiState::new(flows)).await?;
        backend.base_url = server.base_url();
        Some(server)
    } else {
        None
    };

    let client = BackendClient::new(&backend, definition.collection.clone())?
        .with_locale(args.locale.clone());
    let context = EngineContext {
        locale: args.locale,
        is_authenticated: args.sandbox || client.has_token(),
    };

    let local = Arc::new(RuleValidator::new());
    let validator: Arc<dyn escrow_stepper::wizard::Validator> = if args.remote_validation {
        Arc::new(CompositeValidator::new(local, Arc::new(client.validator())))
    } else {
        local
    };

    let client = Arc::new(client);
    let navigator = Arc::new(HistoryNavigator::new());
    let collaborators = Collaborators {
        validator,
        gateway: client.clone(),
        hydration: client.clone(),
        workflow: client,
        navigator: navigator.clone(),
    };

    let flow = definition.to_flow();
    let settings = EngineSettings::from(&config.wizard);
    let engine = match &args.url {
        Some(url) => {
            let route = WizardRoute::parse(url)?;
            StepperEngine::from_route(flow, &route, collaborators, context, settings)?
        }
        None => StepperEngine::new(flow, SessionSeed::add(), collaborators, context, settings)?,
    };

    println!("Running {} against {}", definition.name, backend.base_url);
    let result = runner::run_to_completion(&engine, &answers).await;

    for location in navigator.history() {
        println!("  → {}", location);
    }

    if let Some(server) = sandbox {
        server.shutdown().await;
    }

    let report = result?;
    println!(
        "Completed {} ({} steps), entity {}",
        definition.name,
        report.visited.len(),
        report
            .entity_id
            .as_ref()
            .map_or("-".to_string(), ToString::to_string)
    );

    Ok(())
}
