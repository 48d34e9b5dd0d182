use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flowctl_core::ident::Identifier;
use flowctl_runner::controller::JobController;
use flowctl_runner::remote::MemoryProjectStorage;
use flowctl_runner::volume::{flow_scope, VolumeDriver};

mod backend;

#[derive(Parser)]
#[command(name = "flowctl", author, version, about, long_about = None)]
struct Cli {
    /// Path to the flow YAML file. Defaults to walking upward from the
    /// current directory for `.flowctl/jobs.yml`.
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Role to share launched resources with, if any.
    #[arg(long, global = true)]
    share: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a flow file without touching the remote service.
    Check,
    /// Launch or attach to a job.
    Run {
        job_id: String,
        #[arg(long)]
        suffix: Option<String>,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Kill a running instance of a job.
    Kill {
        job_id: String,
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Kill every running instance belonging to this flow.
    KillAll,
    /// List the status of every declared job.
    Ps,
    /// Report the status of one job instance.
    Status {
        job_id: String,
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Print the logs of one job instance.
    Logs {
        job_id: String,
        #[arg(long)]
        suffix: Option<String>,
    },
    /// List the known `multi:` suffixes for a multi-job.
    ListSuffixes { job_id: String },
    /// Upload a volume's local side to its remote location.
    Upload { volume_id: String },
    /// Upload every volume declaring a local side.
    UploadAll,
    /// Download a volume's remote side to its local location.
    Download { volume_id: String },
    /// Download every volume declaring a local side.
    DownloadAll,
    /// Recursively remove a volume's remote location.
    Clean { volume_id: String },
    /// Clean every volume declaring a local side.
    CleanAll,
    /// Create the remote directories for every local-backed volume.
    Mkvolumes,
    /// Build an image from its declared context and Dockerfile.
    Build {
        image_id: String,
        #[arg(long)]
        force: bool,
    },
    /// Build every buildable image.
    BuildAll {
        #[arg(long)]
        force: bool,
    },
}

fn load_flow(file: Option<&PathBuf>) -> anyhow::Result<flowctl_core::ast::Flow> {
    let path = match file {
        Some(p) => p.clone(),
        None => {
            let cwd = std::env::current_dir()?;
            flowctl_core::parser::find_config(&cwd)
                .ok_or_else(|| anyhow::anyhow!("no flow file given and no .flowctl/jobs.yml found"))?
        }
    };
    let source = std::fs::read_to_string(&path)?;
    Ok(flowctl_core::parser::parse(&source, Some(&path))?)
}

fn build_controller(flow: flowctl_core::ast::Flow, share: Option<String>) -> JobController {
    JobController::new(
        flow,
        Arc::new(backend::UnconfiguredRemoteJobs),
        backend::cli_runner(),
        Arc::new(MemoryProjectStorage::default()),
        Arc::new(backend::NoopRoleManager),
        share,
    )
}

fn build_volume_driver(share: Option<String>) -> VolumeDriver {
    VolumeDriver::new(
        backend::cli_runner(),
        Arc::new(backend::NoopRoleManager),
        share,
    )
}

#[tokio::main]
async fn main() {
    flowctl_core::logging::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if matches!(cli.command, Commands::Check) {
        let flow = load_flow(cli.file.as_ref())?;
        println!("OK: flow '{}' ({} jobs)", flow.id, flow.jobs.len());
        return Ok(());
    }

    match cli.command {
        Commands::Check => unreachable!(),
        Commands::Run { job_id, suffix, args } => {
            let flow = load_flow(cli.file.as_ref())?;
            let controller = build_controller(flow, cli.share);
            let id = Identifier::new(job_id)?;
            let info = controller.run(&id, suffix.as_deref(), args).await?;
            println!("{} {:?} ({})", info.id, info.status, info.remote_id);
        }
        Commands::Kill { job_id, suffix } => {
            let flow = load_flow(cli.file.as_ref())?;
            let controller = build_controller(flow, cli.share);
            let id = Identifier::new(job_id)?;
            controller.kill(&id, suffix.as_deref()).await?;
            println!("killed");
        }
        Commands::KillAll => {
            let flow = load_flow(cli.file.as_ref())?;
            let controller = build_controller(flow, cli.share);
            let killed = controller.kill_all().await?;
            for (job, suffix) in killed {
                match suffix {
                    Some(s) => println!("killed {job} {s}"),
                    None => println!("killed {job}"),
                }
            }
        }
        Commands::Ps => {
            let flow = load_flow(cli.file.as_ref())?;
            let controller = build_controller(flow, cli.share);
            for (id, result) in controller.ps().await {
                match result {
                    Ok(info) => println!(
                        "{id}\t{:?}\t{}\t{}",
                        info.status, info.remote_id, info.when
                    ),
                    Err(e) => println!("{id}\t<error: {e}>"),
                }
            }
        }
        Commands::Status { job_id, suffix } => {
            let flow = load_flow(cli.file.as_ref())?;
            let controller = build_controller(flow, cli.share);
            let id = Identifier::new(job_id)?;
            let info = controller.status(&id, suffix.as_deref()).await?;
            println!("{} {:?} ({})", info.id, info.status, info.remote_id);
        }
        Commands::Logs { job_id, suffix } => {
            let flow = load_flow(cli.file.as_ref())?;
            let controller = build_controller(flow, cli.share);
            let id = Identifier::new(job_id)?;
            let text = controller.logs(&id, suffix.as_deref()).await?;
            print!("{text}");
        }
        Commands::ListSuffixes { job_id } => {
            let flow = load_flow(cli.file.as_ref())?;
            let controller = build_controller(flow, cli.share);
            let id = Identifier::new(job_id)?;
            for suffix in controller.list_suffixes(&id).await? {
                println!("{suffix}");
            }
        }
        Commands::Upload { volume_id } => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            let vol_id = Identifier::new(volume_id)?;
            let volume = flow
                .volumes
                .get(&vol_id)
                .ok_or_else(|| anyhow::anyhow!("unknown volume '{vol_id}'"))?;
            build_volume_driver(cli.share).upload(volume, &scope).await?;
            println!("uploaded");
        }
        Commands::UploadAll => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            build_volume_driver(cli.share).upload_all(&flow, &scope).await?;
            println!("uploaded all");
        }
        Commands::Download { volume_id } => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            let vol_id = Identifier::new(volume_id)?;
            let volume = flow
                .volumes
                .get(&vol_id)
                .ok_or_else(|| anyhow::anyhow!("unknown volume '{vol_id}'"))?;
            build_volume_driver(cli.share).download(volume, &scope).await?;
            println!("downloaded");
        }
        Commands::DownloadAll => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            build_volume_driver(cli.share).download_all(&flow, &scope).await?;
            println!("downloaded all");
        }
        Commands::Clean { volume_id } => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            let vol_id = Identifier::new(volume_id)?;
            let volume = flow
                .volumes
                .get(&vol_id)
                .ok_or_else(|| anyhow::anyhow!("unknown volume '{vol_id}'"))?;
            build_volume_driver(cli.share).clean(volume, &scope).await?;
            println!("cleaned");
        }
        Commands::CleanAll => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            build_volume_driver(cli.share).clean_all(&flow, &scope).await?;
            println!("cleaned all");
        }
        Commands::Mkvolumes => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            build_volume_driver(cli.share).mkvolumes(&flow, &scope).await?;
            println!("volumes created");
        }
        Commands::Build { image_id, force } => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            let img_id = Identifier::new(image_id)?;
            let image = flow
                .images
                .get(&img_id)
                .ok_or_else(|| anyhow::anyhow!("unknown image '{img_id}'"))?;
            build_volume_driver(cli.share).build(image, force, &scope).await?;
            println!("built");
        }
        Commands::BuildAll { force } => {
            let flow = load_flow(cli.file.as_ref())?;
            let scope = flow_scope(&flow);
            build_volume_driver(cli.share)
                .build_all(&flow, force, &scope)
                .await?;
            println!("built all");
        }
    }

    Ok(())
}
