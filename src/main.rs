//! Load-testing topology deployment CLI entrypoint.
//!
//! This is the main entrypoint for the `loadtest-deploy` command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use loadtest_deploy::cli::{Cli, Commands, OutputFormatter, StateCommands};
use loadtest_deploy::config::{
    ConfigParser, ConfigValidator, Scenario, StateBackend, TopologyConfig, find_config_file,
};
use loadtest_deploy::error::{ConfigError, DeployError, Result, StateError};
use loadtest_deploy::planner::{
    DeploymentPlan, DiffEngine, ExecutionResult, PlanExecutor, ResourceKind, credential_document_for,
};
use loadtest_deploy::platform::{GkeProvider, SimulatedProvider, TokenSource};
use loadtest_deploy::state::{
    DeploymentState, LocalStateStore, S3StateStore, StateStore, generate_holder_id, with_lock,
};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment template written by `init`.
const ENV_TEMPLATE: &str = "\
# OAuth access token for GKE and the Kubernetes API.
# When unset, `gcloud config config-helper` is used.
GOOGLE_OAUTH_ACCESS_TOKEN=

# Google Cloud project that owns the cluster.
LOADTEST_GCP_PROJECT=

# Optional overrides
# LOADTEST_PROJECT_NAME=load-testing
# LOADTEST_CLUSTER_LOCATION=asia-east1-b
# LOADTEST_STATE_BUCKET=
# LOADTEST_STATE_PREFIX=
";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag. Logs go to stderr so
/// that stdout only carries command output.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let source = ConfigSource {
        path: cli.config,
        scenario: cli.scenario,
    };

    match cli.command {
        Commands::Init { path, from, force } => cmd_init(&path, from, force),
        Commands::Validate { warnings } => cmd_validate(&source, warnings, &formatter),
        Commands::Plan { detailed, simulate } => {
            cmd_plan(&source, detailed, simulate, &formatter).await
        }
        Commands::Apply { yes, simulate } => cmd_apply(&source, yes, simulate, &formatter).await,
        Commands::Kubeconfig { file } => cmd_kubeconfig(&source, file.as_deref()).await,
        Commands::Output { name } => cmd_output(&source, name.as_deref(), &formatter).await,
        Commands::Destroy { yes, simulate } => {
            cmd_destroy(&source, yes, simulate, &formatter).await
        }
        Commands::State { command } => cmd_state(&source, command, &formatter).await,
    }
}

/// Initialize a new project from a scenario.
fn cmd_init(path: &Path, scenario: Scenario, force: bool) -> Result<()> {
    info!("Initializing {scenario} project in: {}", path.display());

    let config_path = path.join("loadtest.deploy.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, ConfigParser::to_yaml(&scenario.topology())?)?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, ENV_TEMPLATE)?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", ".loadtest/"]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# loadtest-deploy")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.loadtest/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set LOADTEST_GCP_PROJECT");
    eprintln!("  2. Run 'loadtest-deploy plan' to see what will be created");
    eprintln!("  3. Run 'loadtest-deploy apply' to deploy the topology");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(source: &ConfigSource, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let (config, _) = source.load()?;
    let result = ConfigValidator::new().check(&config);

    emit(&formatter.format_validation(&config, &result, show_warnings))?;

    if result.is_valid() {
        Ok(())
    } else {
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        Err(ConfigError::validation(
            format!("{} errors", result.error_count()),
            fields.join(", "),
        )
        .into())
    }
}

/// Show the deployment plan.
async fn cmd_plan(
    source: &ConfigSource,
    detailed: bool,
    simulate: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = source.load_validated()?;
    let plan = DeploymentPlan::build(&config)?;

    let state = if simulate {
        None
    } else {
        let store = open_store(&config, &base_dir).await?;
        load_matching_state(store.as_ref(), &config).await?
    };

    let diff = DiffEngine::new().compute_diff(&plan, state.as_ref());
    emit(&formatter.format_plan(&plan, &diff, detailed))
}

/// Apply the deployment plan.
async fn cmd_apply(
    source: &ConfigSource,
    auto_approve: bool,
    simulate: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = source.load_validated()?;
    let plan = DeploymentPlan::build(&config)?;

    if simulate {
        let provider = SimulatedProvider::new();
        let mut state = DeploymentState::new(&plan.project, &plan.scenario);
        let diff = DiffEngine::new().compute_diff(&plan, None);
        let result = PlanExecutor::new(&provider).apply(&plan, &diff, &mut state).await?;
        return emit(&formatter.format_result(&result));
    }

    let store = open_store(&config, &base_dir).await?;
    let store = store.as_ref();
    let outcome = with_lock(store, "apply", || {
        apply_locked(store, &config, &plan, auto_approve, formatter)
    })
    .await?;

    match outcome {
        Some(result) => emit(&formatter.format_result(&result)),
        None => Ok(()),
    }
}

/// Diffs against recorded state and applies, with the state lock held.
///
/// Returns `None` when there was nothing to do or the user declined.
async fn apply_locked(
    store: &dyn StateStore,
    config: &TopologyConfig,
    plan: &DeploymentPlan,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<Option<ExecutionResult>> {
    let mut state = load_matching_state(store, config)
        .await?
        .unwrap_or_else(|| DeploymentState::new(&plan.project, &plan.scenario));

    let diff = DiffEngine::new().compute_diff(plan, Some(&state));
    if !diff.has_changes() {
        eprintln!("No changes to apply.");
        if !state.outputs.is_empty() {
            emit(&formatter.format_outputs(&state.outputs))?;
        }
        return Ok(None);
    }

    if !formatter.is_json() {
        eprintln!("{}", formatter.format_plan(plan, &diff, false));
    }

    if !auto_approve && !confirm("\nDo you want to apply these changes? Type 'yes' to confirm: ", "yes")? {
        eprintln!("Apply cancelled.");
        return Ok(None);
    }

    let provider = gke_provider(config)?;
    let result = PlanExecutor::new(&provider)
        .with_store(store)
        .apply(plan, &diff, &mut state)
        .await?;
    Ok(Some(result))
}

/// Print the credential document of the deployed cluster.
async fn cmd_kubeconfig(source: &ConfigSource, file: Option<&Path>) -> Result<()> {
    let (config, base_dir) = source.load()?;
    let store = open_store(&config, &base_dir).await?;
    let state = require_state(store.as_ref(), &config).await?;

    let (_, cluster) = state
        .resources_of_kind(ResourceKind::Cluster)
        .next()
        .ok_or_else(|| DeployError::internal("No cluster recorded in state; run 'apply' first"))?;
    let document = credential_document_for(cluster)?;

    match file {
        Some(path) => {
            std::fs::write(path, &document.text)?;
            eprintln!("Wrote credentials for {} to {}", document.context, path.display());
            Ok(())
        }
        None => emit(&document.text),
    }
}

/// Print exported outputs.
async fn cmd_output(source: &ConfigSource, name: Option<&str>, formatter: &OutputFormatter) -> Result<()> {
    let (config, base_dir) = source.load()?;
    let store = open_store(&config, &base_dir).await?;
    let state = require_state(store.as_ref(), &config).await?;

    match name {
        Some(name) => {
            let value = state
                .outputs
                .get(name)
                .ok_or_else(|| DeployError::internal(format!("Output '{name}' not found")))?;
            emit(value)
        }
        None => emit(&formatter.format_outputs(&state.outputs)),
    }
}

/// Destroy all recorded resources.
async fn cmd_destroy(
    source: &ConfigSource,
    auto_approve: bool,
    simulate: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = source.load_validated()?;

    if simulate {
        let plan = DeploymentPlan::build(&config)?;
        let provider = SimulatedProvider::new();
        let executor = PlanExecutor::new(&provider);
        let mut state = DeploymentState::new(&plan.project, &plan.scenario);
        let diff = DiffEngine::new().compute_diff(&plan, None);
        executor.apply(&plan, &diff, &mut state).await?;
        let result = executor.destroy(&mut state).await?;
        return emit(&formatter.format_result(&result));
    }

    let store = open_store(&config, &base_dir).await?;
    let store = store.as_ref();
    let outcome = with_lock(store, "destroy", || destroy_locked(store, &config, auto_approve)).await?;

    match outcome {
        Some(result) => emit(&formatter.format_result(&result)),
        None => Ok(()),
    }
}

/// Destroys every recorded resource, with the state lock held.
///
/// Returns `None` when nothing is recorded or the user declined.
async fn destroy_locked(
    store: &dyn StateStore,
    config: &TopologyConfig,
    auto_approve: bool,
) -> Result<Option<ExecutionResult>> {
    let Some(mut state) = load_matching_state(store, config).await? else {
        eprintln!("No state found, nothing to destroy.");
        return Ok(None);
    };
    if state.is_empty() {
        eprintln!("No resources recorded, nothing to destroy.");
        return Ok(None);
    }

    let mut doomed: Vec<(&String, ResourceKind)> =
        state.resources.iter().map(|(key, r)| (key, r.kind)).collect();
    doomed.sort_by_key(|(_, kind)| std::cmp::Reverse(*kind));
    eprintln!("The following resources will be destroyed:");
    for (key, _) in &doomed {
        eprintln!("  - {key}");
    }

    if !auto_approve && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")? {
        eprintln!("Destruction cancelled.");
        return Ok(None);
    }

    let provider = gke_provider(config)?;
    let result = PlanExecutor::new(&provider)
        .with_store(store)
        .destroy(&mut state)
        .await?;
    Ok(Some(result))
}

/// State management commands.
async fn cmd_state(source: &ConfigSource, command: StateCommands, formatter: &OutputFormatter) -> Result<()> {
    let (config, base_dir) = source.load()?;
    let store = open_store(&config, &base_dir).await?;

    match command {
        StateCommands::Show => {
            if let Some(state) = store.load().await? {
                emit(&formatter.format_state(&state))?;
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = store.acquire_lock(&holder, "manual").await?;
            eprintln!("State locked: {}", lock.lock_id);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock_info) = store.get_lock_info().await? {
                    store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("State forcefully unlocked.");
                } else {
                    eprintln!("State is not locked.");
                }
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Where the topology comes from: a built-in scenario or a configuration file.
struct ConfigSource {
    path: Option<PathBuf>,
    scenario: Option<Scenario>,
}

impl ConfigSource {
    /// Loads the topology and the directory local state lives under.
    fn load(&self) -> Result<(TopologyConfig, PathBuf)> {
        if let Some(scenario) = self.scenario {
            ConfigParser::new().load_dotenv()?;
            let mut config = scenario.topology();
            ConfigParser::apply_env_overrides(&mut config);
            return Ok((config, std::env::current_dir()?));
        }

        let config_file = match &self.path {
            Some(path) => path.clone(),
            None => find_config_file(std::env::current_dir()?)?,
        };
        debug!("Loading configuration from: {}", config_file.display());

        let base_dir = config_file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let parser = ConfigParser::new().with_base_path(&base_dir);
        parser.load_dotenv()?;

        Ok((parser.load_with_env(&config_file)?, base_dir))
    }

    /// Loads and validates the topology.
    fn load_validated(&self) -> Result<(TopologyConfig, PathBuf)> {
        let (config, base_dir) = self.load()?;
        let result = ConfigValidator::new().validate(&config)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }
        Ok((config, base_dir))
    }
}

/// Creates the state store the configuration selects.
async fn open_store(config: &TopologyConfig, base_dir: &Path) -> Result<Box<dyn StateStore>> {
    let store: Box<dyn StateStore> = match config.state.backend {
        StateBackend::Local => match config.state.path.as_deref() {
            Some(path) => Box::new(LocalStateStore::with_base_dir(base_dir.join(path))),
            None => Box::new(LocalStateStore::with_base_dir(base_dir.join(".loadtest"))),
        },
        StateBackend::S3 => {
            let bucket = config
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| DeployError::internal("S3 bucket not configured"))?;
            let prefix = config.state.prefix.as_deref();
            let region = config.state.region.as_deref();
            Box::new(S3StateStore::new(bucket, prefix, region).await?)
        }
    };
    debug!("Using {} state backend", store.backend_type());
    Ok(store)
}

/// Loads state, rejecting state recorded for another project.
async fn load_matching_state(
    store: &dyn StateStore,
    config: &TopologyConfig,
) -> Result<Option<DeploymentState>> {
    let Some(state) = store.load().await? else {
        return Ok(None);
    };

    if state.project != config.project.name {
        return Err(StateError::Mismatch {
            expected: config.project.name.clone(),
            found: state.project,
        }
        .into());
    }
    Ok(Some(state))
}

/// Loads state that must exist.
async fn require_state(store: &dyn StateStore, config: &TopologyConfig) -> Result<DeploymentState> {
    load_matching_state(store, config)
        .await?
        .ok_or_else(|| DeployError::internal("No state found; run 'apply' first"))
}

/// Creates the GKE provider for the configured project.
fn gke_provider(config: &TopologyConfig) -> Result<GkeProvider> {
    let project = ConfigParser::require_gcp_project(config)?;
    Ok(GkeProvider::new(&project, TokenSource::from_env())?
        .with_operation_poll(Duration::from_secs(config.rollout.operation_poll_secs)))
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == expected)
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text.trim_end())?;
    Ok(())
}
