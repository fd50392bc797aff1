//! CLI subcommands: init, validate, synth, diff, apply, destroy, schema.

use crate::core::error::{Error, Result};
use crate::core::{parser, planner, state, types};
use crate::engine::{self, EngineAction, EngineConfig};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stacks.yaml with the Atlas starter stack
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a stack file (declaration + synthesis in memory) or a plan file
    Validate {
        /// Path to stacks.yaml
        #[arg(short, long, default_value = "stacks.yaml")]
        file: PathBuf,

        /// Validate a synthesized plan.json instead
        #[arg(long, conflicts_with = "file")]
        plan: Option<PathBuf>,
    },

    /// Synthesize every stack into plan files
    Synth {
        /// Path to stacks.yaml
        #[arg(short, long, default_value = "stacks.yaml")]
        file: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "synth.out")]
        out: PathBuf,
    },

    /// Preview changes through the engine
    Diff(EngineArgs),

    /// Apply plans through the engine
    Apply(EngineArgs),

    /// Destroy stacks through the engine
    Destroy(EngineArgs),

    /// Print the JSON Schema of plan files
    Schema,
}

#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Output directory written by `synth`
    #[arg(short, long, default_value = "synth.out")]
    pub out: PathBuf,

    /// Target a single stack
    #[arg(short, long)]
    pub stack: Option<String>,

    /// Engine executable
    #[arg(long, env = "STACKSYNTH_ENGINE", default_value = crate::engine::DEFAULT_ENGINE)]
    pub engine: String,

    /// Environment prefix the engine reads variables from
    #[arg(long, env = "STACKSYNTH_VAR_PREFIX", default_value = crate::engine::DEFAULT_VAR_PREFIX)]
    pub var_prefix: String,

    /// Extra arguments passed to the engine after the sub-command
    #[arg(last = true)]
    pub engine_args: Vec<String>,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file, plan } => match plan {
            Some(plan) => cmd_validate_plan(&plan),
            None => cmd_validate(&file),
        },
        Commands::Synth { file, out } => cmd_synth(&file, &out),
        Commands::Diff(args) => cmd_engine(EngineAction::Diff, &args),
        Commands::Apply(args) => cmd_engine(EngineAction::Apply, &args),
        Commands::Destroy(args) => cmd_engine(EngineAction::Destroy, &args),
        Commands::Schema => cmd_schema(),
    }
}

const TEMPLATE: &str = r#"version: "1.0"
name: cdktf-gcp-mongodbatlas
stacks:
  atlas:
    strict: true
    variables:
      publicKey:
        type: string
        description: MongoDB Atlas Org Public Key
        sensitive: true
      privateKey:
        type: string
        description: MongoDB Atlas Org Private Key
        sensitive: true
      orgId:
        type: string
        description: MongoDB Atlas Org ID
        sensitive: true
      adminPassword:
        type: string
        description: MongoDB Atlas Cluster DB Admin
        sensitive: true
      userNetwork:
        type: string
        description: MongoDB Atlas Project IP access
        sensitive: false
    providers:
      mongodbatlas:
        public_key: "{{var.publicKey}}"
        private_key: "{{var.privateKey}}"
    resources:
      newProject:
        type: mongodbatlas_project
        config:
          name: CDKTFProject1
          org_id: "{{var.orgId}}"
      newCluster1:
        type: mongodbatlas_cluster
        config:
          project_id: "{{ref.newProject.id}}"
          name: atlasClusterCDK
          cluster_type: REPLICASET
          cloud_backup: false
          mongo_db_major_version: "5.0"
          provider_name: TENANT
          backing_provider_name: GCP
          provider_instance_size_name: M0
          provider_region_name: CENTRAL_US
          replication_specs:
            - num_shards: 1
              regions_config:
                - electable_nodes: 3
                  priority: 7
                  read_only_nodes: 0
                  region_name: CENTRAL_US
      adminUser:
        type: mongodbatlas_database_user
        config:
          username: cdktf-adminuser
          password: "{{var.adminPassword}}"
          project_id: "{{ref.newProject.id}}"
          auth_database_name: admin
          roles:
            - role_name: readAnyDatabase
              database_name: admin
          scopes:
            - name: "{{ref.newCluster1.name}}"
              type: CLUSTER
      projectnetworkAccess:
        type: mongodbatlas_project_ip_access_list
        config:
          project_id: "{{ref.newProject.id}}"
          cidr_block: "{{var.userNetwork}}"
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = path.join("stacks.yaml");
    if config_path.exists() {
        return Err(Error::output(&config_path, "already exists"));
    }
    std::fs::create_dir_all(path).map_err(|e| Error::io(path, e))?;
    std::fs::write(&config_path, TEMPLATE).map_err(|e| Error::io(&config_path, e))?;

    println!("Initialized stacksynth project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    let mut app = parser::load_app(file)?;
    let plans = app.synth()?;
    let resources: usize = plans.iter().map(|p| p.resources.len()).sum();
    println!(
        "OK: {} ({} stacks, {} resources)",
        app.name(),
        plans.len(),
        resources
    );
    Ok(())
}

fn cmd_validate_plan(path: &Path) -> Result<()> {
    let plan = state::read_plan(path)?;
    planner::check_plan(&plan)?;
    println!(
        "OK: plan for stack '{}' ({} variables, {} resources)",
        plan.stack,
        plan.variables.len(),
        plan.resources.len()
    );
    Ok(())
}

fn cmd_synth(file: &Path, out: &Path) -> Result<()> {
    let mut app = parser::load_app(file)?;
    let plans = app.synth()?;
    let manifest = state::save_app(out, app.name(), &plans)?;

    println!("Synthesized: {} ({} stacks)", app.name(), plans.len());
    println!();
    for plan in &plans {
        println!("{}:", plan.stack);
        for line in planner::describe(plan) {
            println!("{}", line);
        }
        println!();
    }
    for (stack, entry) in &manifest.stacks {
        println!("  {} -> {} [{}]", stack, out.join(&entry.plan).display(), entry.digest);
    }
    Ok(())
}

/// Plans named in the manifest, optionally narrowed to one stack.
fn load_plans(out: &Path, filter: Option<&str>) -> Result<Vec<types::Plan>> {
    let manifest = state::load_manifest(out)?.ok_or_else(|| {
        Error::output(out, "no manifest.json found; run `stacksynth synth` first")
    })?;

    if let Some(stack) = filter {
        if !manifest.stacks.contains_key(stack) {
            return Err(Error::output(out, format!("no stack '{}' in manifest", stack)));
        }
    }

    let stale = state::stale_plans(out, &manifest)?;
    if let Some(stack) = stale.iter().find(|s| filter.is_none_or(|f| f == s.as_str())) {
        return Err(Error::output(
            state::plan_path(out, stack),
            "plan no longer matches manifest digest; run `stacksynth synth` again",
        ));
    }

    let mut plans = Vec::new();
    for stack in manifest.stacks.keys() {
        if filter.is_some_and(|f| f != stack.as_str()) {
            continue;
        }
        let path = state::plan_path(out, stack);
        let plan = state::read_plan(&path)?;
        planner::check_plan(&plan)?;
        plans.push(plan);
    }
    Ok(plans)
}

fn cmd_engine(action: EngineAction, args: &EngineArgs) -> Result<()> {
    let plans = load_plans(&args.out, args.stack.as_deref())?;
    let cfg = EngineConfig {
        program: args.engine.clone(),
        var_prefix: args.var_prefix.clone(),
        extra_args: args.engine_args.clone(),
    };

    // Check every stack before running any of them.
    for plan in &plans {
        engine::check_variables(plan, &cfg.var_prefix, |key| std::env::var(key).ok())?;
    }

    for plan in &plans {
        println!("{} {} ({} resources)", action, plan.stack, plan.resources.len());
        let out = engine::run(&cfg, action, &state::stack_dir(&args.out, &plan.stack), plan)?;
        print!("{}", out.stdout);
        if !out.stderr.is_empty() {
            eprint!("{}", out.stderr);
        }
    }
    println!();
    println!("{} complete: {} stack(s).", action, plans.len());
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(types::Plan);
    let json = serde_json::to_string_pretty(&schema).map_err(|e| Error::Serialization {
        resource: "schema".to_string(),
        field: "plan".to_string(),
        reason: e.to_string(),
    })?;
    println!("{}", json);
    Ok(())
}
