mod manifest;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use slsform_core::differ::{create_destroy_plan, create_plan};
use slsform_core::effect::Effect;
use slsform_core::identifier::CompositeId;
use slsform_core::plan::Plan;
use slsform_core::provider::Provider;
use slsform_core::resource::{Resource, ResourceId, State, Value};
use slsform_core::schema::ResourceSchema;
use slsform_provider_sls::resources::resource_type;
use slsform_provider_sls::{MemorySls, SlsConfig, SlsProvider, schemas};

use manifest::{LocalState, Manifest};

#[derive(Parser)]
#[command(name = "slsform")]
#[command(
    about = "Manage log service dashboards, machine groups and collection policies",
    long_about = None
)]
struct Cli {
    /// Directory holding the local state and the service store
    #[arg(long, global = true, env = "SLSFORM_DIR", default_value = ".slsform")]
    dir: PathBuf,

    /// Region (overrides the manifest's provider block)
    #[arg(long, global = true, env = "SLSFORM_REGION")]
    region: Option<String>,

    /// Service endpoint (overrides the manifest's provider block)
    #[arg(long, global = true, env = "SLSFORM_ENDPOINT")]
    endpoint: Option<String>,

    /// Timeout in seconds for every create, update and delete
    #[arg(long, global = true, env = "SLSFORM_TIMEOUT")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest
    Validate {
        /// Path to manifest file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to manifest file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to manifest file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Destroy all resources defined in the manifest
    Destroy {
        /// Path to manifest file
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Read one resource by its composite identifier
    Read {
        /// Resource type (e.g., log_machine_group)
        resource_type: String,
        /// Composite identifier (e.g., my-project:my-group)
        identifier: String,
    },
    /// Apply a logtail config to several machine groups
    Attach {
        project: String,
        config: String,
        #[arg(required = true)]
        groups: Vec<String>,
    },
    /// Parse a composite identifier and print its segments
    Id {
        resource_type: String,
        identifier: String,
    },
}

/// Provider settings given on the command line or in the environment
struct Overrides {
    region: Option<String>,
    endpoint: Option<String>,
    timeout: Option<u64>,
}

impl Overrides {
    fn apply(&self, mut config: SlsConfig) -> SlsConfig {
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let overrides = Overrides {
        region: cli.region,
        endpoint: cli.endpoint,
        timeout: cli.timeout,
    };
    let dir = cli.dir;

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &dir, &overrides).await,
        Commands::Apply { file } => run_apply(&file, &dir, &overrides).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, &dir, &overrides, auto_approve).await
        }
        Commands::Read {
            resource_type,
            identifier,
        } => run_read(&resource_type, &identifier, &dir, &overrides).await,
        Commands::Attach {
            project,
            config,
            groups,
        } => run_attach(&project, &config, &groups, &dir, &overrides).await,
        Commands::Id {
            resource_type,
            identifier,
        } => run_id(&resource_type, &identifier),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

// =============================================================================
// Workspace
// =============================================================================

/// Provider, service store and local state of one invocation
struct Workspace {
    sls: Arc<MemorySls>,
    provider: SlsProvider,
    state: LocalState,
    store_path: PathBuf,
    state_path: PathBuf,
}

impl Workspace {
    fn open(dir: &Path, config: SlsConfig) -> Result<Self, String> {
        let store_path = dir.join("service.json");
        let state_path = dir.join("state.json");
        let sls = Arc::new(
            MemorySls::load(&store_path)
                .map_err(|e| format!("Failed to load {}: {}", store_path.display(), e))?,
        );
        log::debug!(
            "using region {} at {}",
            config.region,
            config.endpoint()
        );
        Ok(Self {
            provider: SlsProvider::new(sls.clone(), config),
            sls,
            state: LocalState::load(&state_path)?,
            store_path,
            state_path,
        })
    }

    fn save(&self) -> Result<(), String> {
        self.sls
            .save(&self.store_path)
            .map_err(|e| format!("Failed to save {}: {}", self.store_path.display(), e))?;
        self.state.save(&self.state_path)
    }

    /// Identifier a declared resource lives under: recorded, or derived
    fn identifier_of(&self, resource: &Resource) -> Result<String, String> {
        match self.state.identifier(&resource.id) {
            Some(identifier) => Ok(identifier.to_string()),
            None => self
                .provider
                .identifier_for(resource)
                .map_err(|e| format!("{}: {}", resource.id, e)),
        }
    }

    /// Current state of every declared resource
    async fn read_states(
        &self,
        resources: &[Resource],
    ) -> Result<HashMap<ResourceId, State>, String> {
        let mut states = HashMap::new();
        for resource in resources {
            let identifier = self.identifier_of(resource)?;
            let state = self
                .provider
                .read(&resource.id, Some(&identifier))
                .await
                .map_err(|e| format!("Failed to read state: {}", e))?;
            states.insert(resource.id.clone(), state);
        }
        Ok(states)
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    let mut all_schemas = HashMap::new();
    for schema in schemas::all_schemas() {
        all_schemas.insert(schema.resource_type.clone(), schema);
    }
    all_schemas
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let schemas = get_schemas();
    let mut all_errors = Vec::new();

    for resource in resources {
        match schemas.get(&resource.id.resource_type) {
            Some(schema) => {
                if let Err(errors) = schema.validate(&resource.attributes) {
                    for error in errors {
                        all_errors.push(format!("{}: {}", resource.id, error));
                    }
                }
            }
            None => all_errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

/// Validated desired resources with defaults filled in
fn load_resources(manifest: &Manifest, provider: &SlsProvider) -> Result<Vec<Resource>, String> {
    let resources = manifest.resources();
    validate_resources(&resources)?;
    resources
        .iter()
        .map(|r| provider.normalize(r).map_err(|e| e.to_string()))
        .collect()
}

// =============================================================================
// Commands
// =============================================================================

fn run_validate(file: &Path) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let resources = manifest.resources();
    validate_resources(&resources)?;

    let provider = SlsProvider::new(Arc::new(MemorySls::new()), manifest.provider.clone());
    for resource in &resources {
        provider
            .identifier_for(resource)
            .map_err(|e| format!("{}: {}", resource.id, e))?;
    }

    println!("{}", "Validating...".cyan());
    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            resources.len()
        )
        .green()
        .bold()
    );

    for resource in &resources {
        println!("  • {}", resource.id);
    }

    Ok(())
}

async fn run_plan(file: &Path, dir: &Path, overrides: &Overrides) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let ws = Workspace::open(dir, overrides.apply(manifest.provider.clone()))?;
    let resources = load_resources(&manifest, &ws.provider)?;

    let current_states = ws.read_states(&resources).await?;
    let plan = create_plan(&resources, &current_states, &get_schemas());
    print_plan(&plan, &current_states);
    Ok(())
}

async fn run_apply(file: &Path, dir: &Path, overrides: &Overrides) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let mut ws = Workspace::open(dir, overrides.apply(manifest.provider.clone()))?;
    let resources = load_resources(&manifest, &ws.provider)?;

    let current_states = ws.read_states(&resources).await?;
    let plan = create_plan(&resources, &current_states, &get_schemas());

    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan, &current_states);
    println!();

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;

    for effect in plan.effects() {
        let result = match effect {
            Effect::Create(resource) => ws.provider.create(resource).await.map(|state| {
                if let Some(identifier) = &state.identifier {
                    ws.state.record(&resource.id, identifier.clone());
                }
            }),
            Effect::Update {
                id,
                identifier,
                from,
                to,
            } => ws.provider.update(id, identifier, from, to).await.map(|_| ()),
            Effect::Delete { id, identifier } => ws
                .provider
                .delete(id, identifier)
                .await
                .map(|()| ws.state.forget(id)),
        };

        match result {
            Ok(()) => {
                println!("  {} {}", "✓".green(), effect);
                success_count += 1;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), effect, e);
                failure_count += 1;
            }
        }
    }

    ws.save()?;

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

async fn run_destroy(
    file: &Path,
    dir: &Path,
    overrides: &Overrides,
    auto_approve: bool,
) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let mut ws = Workspace::open(dir, overrides.apply(manifest.provider.clone()))?;
    let resources = manifest.resources();

    if resources.is_empty() {
        println!("{}", "No resources defined in manifest.".yellow());
        return Ok(());
    }

    let current_states = ws.read_states(&resources).await?;
    let states: Vec<State> = resources
        .iter()
        .filter_map(|r| current_states.get(&r.id).cloned())
        .collect();
    let plan = create_destroy_plan(&states);

    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        plan.effects().len().to_string().red()
    );
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;

    for effect in plan.effects() {
        if let Effect::Delete { id, identifier } = effect {
            match ws.provider.delete(id, identifier).await {
                Ok(()) => {
                    println!("  {} {}", "✓".green(), effect);
                    ws.state.forget(id);
                    success_count += 1;
                }
                Err(e) => {
                    println!("  {} {} - {}", "✗".red(), effect, e);
                    failure_count += 1;
                }
            }
        }
    }

    ws.save()?;

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

async fn run_read(
    type_name: &str,
    identifier: &str,
    dir: &Path,
    overrides: &Overrides,
) -> Result<(), String> {
    if resource_type(type_name).is_none() {
        return Err(format!("Unknown resource type: {}", type_name));
    }
    let ws = Workspace::open(dir, overrides.apply(SlsConfig::default()))?;
    let id = ResourceId::new(type_name, identifier);

    let state = ws
        .provider
        .read(&id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;

    if !state.exists {
        println!("{}", format!("{} {} not found.", type_name, identifier).yellow());
        return Ok(());
    }

    let attributes: BTreeMap<&String, &Value> = state.attributes.iter().collect();
    let json = serde_json::to_string_pretty(&attributes).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

async fn run_attach(
    project: &str,
    config: &str,
    groups: &[String],
    dir: &Path,
    overrides: &Overrides,
) -> Result<(), String> {
    let ws = Workspace::open(dir, overrides.apply(SlsConfig::default()))?;

    println!(
        "{}",
        format!(
            "Attaching logtail config '{}' to {} machine groups...",
            config,
            groups.len()
        )
        .cyan()
        .bold()
    );
    println!();

    let result = ws
        .provider
        .attach_config_to_groups(project, config, groups)
        .await;
    ws.save()?;

    match result {
        Ok(identifiers) => {
            for identifier in &identifiers {
                println!("  {} {}", "✓".green(), identifier);
            }
            println!();
            println!(
                "{}",
                format!("Attach complete! {} attachments created.", identifiers.len())
                    .green()
                    .bold()
            );
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

fn run_id(type_name: &str, identifier: &str) -> Result<(), String> {
    let resource_type =
        resource_type(type_name).ok_or_else(|| format!("Unknown resource type: {}", type_name))?;
    let id = CompositeId::parse(identifier, resource_type.identifier_arity())
        .map_err(|e| e.to_string())?;

    println!("{}", id.to_string().bold());
    for (index, part) in id.parts().iter().enumerate() {
        println!("  [{}] {}", index, part);
    }
    Ok(())
}

// =============================================================================
// Output
// =============================================================================

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input.trim() == "yes")
}

fn print_plan(plan: &Plan, current_states: &HashMap<ResourceId, State>) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        match effect {
            Effect::Create(resource) => {
                println!("  {} {}", "+".green().bold(), resource.id);
                let sorted: BTreeMap<_, _> = resource.attributes.iter().collect();
                for (key, value) in sorted {
                    println!("      {}: {}", key, format_value(value).green());
                }
            }
            Effect::Update { from, to, .. } => {
                println!("  {} {}", "~".yellow().bold(), effect);
                let sorted: BTreeMap<_, _> = to.attributes.iter().collect();
                for (key, value) in sorted {
                    match from.attributes.get(key) {
                        Some(old) if old == value => {}
                        Some(old) => println!(
                            "      {}: {} → {}",
                            key,
                            format_value(old).red(),
                            format_value(value).green()
                        ),
                        None => println!("      {}: {}", key, format_value(value).green()),
                    }
                }
            }
            Effect::Delete { id, .. } => {
                let replaced = current_states.get(id).is_some_and(|s| s.exists)
                    && plan
                        .effects()
                        .iter()
                        .any(|e| matches!(e, Effect::Create(r) if &r.id == id));
                if replaced {
                    println!("  {} {} (replace)", "-/+".magenta().bold(), effect);
                } else {
                    println!("  {} {}", "-".red().bold(), effect);
                }
            }
        }
    }

    println!();
    println!("{}", plan.summary());
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(map) => {
            let sorted: BTreeMap<_, _> = map.iter().collect();
            let entries: Vec<String> = sorted
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_value_is_stable() {
        let mut map = HashMap::new();
        map.insert("resource_mode".to_string(), Value::from("all"));
        map.insert("regions".to_string(), Value::string_list(["cn-hangzhou"]));

        assert_eq!(
            format_value(&Value::Map(map)),
            r#"{regions: ["cn-hangzhou"], resource_mode: "all"}"#
        );
        assert_eq!(format_value(&Value::Int(30)), "30");
    }

    #[test]
    fn overrides_take_precedence_over_manifest() {
        let overrides = Overrides {
            region: Some("cn-shanghai".to_string()),
            endpoint: None,
            timeout: Some(30),
        };
        let config = overrides.apply(SlsConfig::default());

        assert_eq!(config.region, "cn-shanghai");
        assert_eq!(config.endpoint(), "cn-shanghai.log.aliyuncs.com");
        assert_eq!(config.delete_timeout(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn unknown_types_fail_validation() {
        let resources = vec![Resource::new("log_store", "main")];
        let err = validate_resources(&resources).unwrap_err();
        assert!(err.contains("unknown resource type 'log_store'"));
    }

    #[tokio::test]
    async fn apply_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config = SlsConfig {
            poll_interval: 0,
            poll_delay: 0,
            ..SlsConfig::default()
        };
        let centralize_config = HashMap::from([
            ("dest_project".to_string(), Value::from("central")),
            ("dest_logstore".to_string(), Value::from("oss-logs")),
            ("dest_region".to_string(), Value::from("")),
        ]);
        let policy_config = HashMap::from([
            ("resource_mode".to_string(), Value::from("all")),
            ("regions".to_string(), Value::List(vec![])),
        ]);
        let resources = vec![
            Resource::new("log_machine_group", "web")
                .with_attribute("project", "proj1")
                .with_attribute("name", "grp1")
                .with_attribute("identify_list", Value::string_list(["10.0.0.1"])),
            Resource::new("log_dashboard", "main")
                .with_attribute("project_name", "proj1")
                .with_attribute("dashboard_name", "dash1")
                .with_attribute("char_list", r#"[ {"title": "errors"} ]"#),
            Resource::new("sls_collection_policy", "oss")
                .with_attribute("policy_name", "oss-all")
                .with_attribute("data_code", "access_log")
                .with_attribute("product_code", "oss")
                .with_attribute("enabled", true)
                .with_attribute("policy_config", Value::Map(policy_config))
                .with_attribute("centralize_config", Value::Map(centralize_config)),
        ];

        let ws = Workspace::open(dir.path(), config.clone()).unwrap();
        let desired: Vec<Resource> = resources
            .iter()
            .map(|r| ws.provider.normalize(r).unwrap())
            .collect();
        let states = ws.read_states(&desired).await.unwrap();
        let plan = create_plan(&desired, &states, &get_schemas());
        assert_eq!(plan.effects().len(), 3);

        for effect in plan.effects() {
            if let Effect::Create(r) = effect {
                ws.provider.create(r).await.unwrap();
            }
        }
        ws.save().unwrap();

        let ws = Workspace::open(dir.path(), config).unwrap();
        let states = ws.read_states(&desired).await.unwrap();
        let plan = create_plan(&desired, &states, &get_schemas());
        assert!(plan.is_empty(), "unexpected effects: {:?}", plan.effects());
    }
}
