mod commands;
mod context;
mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "skyrun",
    version,
    about = "Run local code as serverless cloud jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Args)]
struct JobArgs {
    /// vCPUs for the task (0.25, 0.5, 1, 2, 4, 8, 16)
    #[arg(long, default_value_t = 0.25)]
    vcpus: f64,
    /// Memory in MB (must pair with the vCPU count)
    #[arg(long, default_value_t = 512)]
    memory: u32,
    /// Run on spot capacity
    #[arg(long)]
    spot: bool,
    /// Function inside the script to call
    #[arg(long)]
    method: Option<String>,
    /// JSON parameters passed to the method
    #[arg(long)]
    params: Option<String>,
    /// Extra exclude pattern when packaging (repeatable)
    #[arg(long = "exclude")]
    excludes: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision cloud infrastructure for an environment
    Setup {
        /// Target environment name
        #[arg(long, default_value = "default")]
        env: String,
        /// Region to provision in
        #[arg(long)]
        region: Option<String>,
        /// Existing VPC to run tasks in (requires --subnet-id)
        #[arg(long, requires = "subnet_id")]
        vpc_id: Option<String>,
        /// Subnet within --vpc-id
        #[arg(long, requires = "vpc_id")]
        subnet_id: Option<String>,
        /// Extra executor image build command (repeatable)
        #[arg(long = "build-command")]
        build_commands: Vec<String>,
    },
    /// Delete an environment's infrastructure and its schedules
    Teardown {
        #[arg(long, default_value = "default")]
        env: String,
    },
    /// Package a script and run it as a one-off job
    Run {
        /// Script file or project directory
        script: PathBuf,
        #[arg(long, default_value = "default")]
        env: String,
        /// Log group override for this run
        #[arg(long)]
        log_group: Option<String>,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Manage recurring schedules
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Fetch or follow task logs
    Logs {
        #[arg(long, default_value = "default")]
        env: String,
        /// Log group (defaults to the environment's group)
        #[arg(long)]
        group: Option<String>,
        /// Restrict to one task id or job id
        #[arg(long)]
        task: Option<String>,
        /// How far back to read (e.g. 30m, 2h, 1d)
        #[arg(long, default_value = "1h")]
        since: String,
        /// Provider-side filter pattern
        #[arg(long)]
        filter: Option<String>,
        /// Keep polling for new events until interrupted
        #[arg(long)]
        follow: bool,
        /// Prefix each line with its stream name
        #[arg(long)]
        show_stream_names: bool,
    },
    /// Inspect and stop tasks
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Create a named schedule
    Create {
        /// Schedule name, unique within the environment
        name: String,
        /// Script file or project directory
        script: PathBuf,
        /// Six-field cron expression (e.g. "0 3 * * ? *")
        #[arg(long, conflicts_with = "rate", required_unless_present = "rate")]
        cron: Option<String>,
        /// Fixed interval (e.g. "1 hour", "15 minutes")
        #[arg(long, conflicts_with = "cron", required_unless_present = "cron")]
        rate: Option<String>,
        #[arg(long, default_value = "default")]
        env: String,
        #[command(flatten)]
        job: JobArgs,
    },
    /// List this environment's schedules
    List {
        #[arg(long, default_value = "default")]
        env: String,
    },
    /// Delete a named schedule
    Delete {
        name: String,
        #[arg(long, default_value = "default")]
        env: String,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List running and recently stopped tasks
    List {
        #[arg(long, default_value = "default")]
        env: String,
    },
    /// Stop a task by task id or job id
    Stop {
        id: String,
        #[arg(long, default_value = "default")]
        env: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Setup { env, region, vpc_id, subnet_id, build_commands } => {
            commands::setup::execute(&env, region, vpc_id, subnet_id, build_commands).await
        }
        Commands::Teardown { env } => commands::teardown::execute(&env).await,
        Commands::Run { script, env, log_group, job } => {
            commands::run::execute(&script, &env, log_group, &job).await
        }
        Commands::Schedule { command } => match command {
            ScheduleCommands::Create { name, script, cron, rate, env, job } => {
                commands::schedule::create(&name, &script, cron, rate, &env, &job).await
            }
            ScheduleCommands::List { env } => commands::schedule::list(&env).await,
            ScheduleCommands::Delete { name, env } => commands::schedule::delete(&name, &env).await,
        },
        Commands::Logs { env, group, task, since, filter, follow, show_stream_names } => {
            commands::logs::execute(&env, group, task, &since, filter, follow, show_stream_names)
                .await
        }
        Commands::Tasks { command } => match command {
            TaskCommands::List { env } => commands::tasks::list(&env).await,
            TaskCommands::Stop { id, env } => commands::tasks::stop(&id, &env).await,
        },
    }
}
