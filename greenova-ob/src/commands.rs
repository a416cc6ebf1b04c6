//! Command handlers

use crate::output;
use crate::{
    AppContext, Command, ExportArgs, ImportArgs, MechanismCommand, ObligationCommand,
    ProjectCommand,
};
use anyhow::{bail, Context, Result};
use greenova_common::aggregate::sync_all_mechanisms;
use greenova_common::analytics::{build_dashboard, overdue, upcoming};
use greenova_common::export::export_obligations;
use greenova_common::import::{ImportOptions, Importer};
use greenova_common::repository::{ObligationFilter, ObligationRepository, SqliteRepository};
use greenova_common::service::ObligationService;
use greenova_common::time::today;
use greenova_common::validate::ObligationForm;
use greenova_common::{Error, Project};
use std::io::Write;
use tracing::info;

pub async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::ImportObligations(args) => import_obligations(ctx, args).await,
        Command::SyncMechanisms => sync_mechanisms(ctx).await,
        Command::Report { project, json } => report(ctx, project.as_deref(), json).await,
        Command::Overdue { project, json } => {
            let obligations = load_obligations(ctx, project.as_deref()).await?;
            let list = overdue(&obligations, today());
            output::print_obligations(&list, "overdue", json)
        }
        Command::Upcoming {
            project,
            days,
            json,
        } => {
            let obligations = load_obligations(ctx, project.as_deref()).await?;
            let list = upcoming(&obligations, today(), i64::from(days));
            output::print_obligations(&list, &format!("due in the next {} days", days), json)
        }
        Command::Export(args) => export(ctx, args).await,
        Command::Obligation(cmd) => obligation(ctx, cmd).await,
        Command::Project(cmd) => project(ctx, cmd).await,
        Command::Mechanism(cmd) => mechanism(ctx, cmd).await,
    }
}

fn service(ctx: &AppContext) -> ObligationService<'_> {
    ObligationService::new(
        &ctx.pool,
        &ctx.config.vocabulary,
        &ctx.config.identifiers,
    )
}

async fn require_project<R>(repo: &mut R, name: &str) -> Result<Project>
where
    R: ObligationRepository + ?Sized,
{
    repo.find_project(name)
        .await?
        .with_context(|| format!("Project '{}' not found", name))
}

async fn load_obligations(
    ctx: &AppContext,
    project: Option<&str>,
) -> Result<Vec<greenova_common::Obligation>> {
    let mut conn = ctx.pool.acquire().await?;
    let mut repo = SqliteRepository::new(&mut conn);

    let project_id = match project {
        Some(name) => Some(require_project(&mut repo, name).await?.id),
        None => None,
    };
    let filter = ObligationFilter {
        project_id,
        ..Default::default()
    };
    Ok(repo.list_obligations(&filter).await?)
}

async fn import_obligations(ctx: &AppContext, args: ImportArgs) -> Result<()> {
    let options = ImportOptions {
        default_project: args.project,
        update: args.update,
        dry_run: args.dry_run,
        continue_on_error: args.continue_on_error,
        use_transaction: !args.no_transaction,
    };

    let importer = Importer::new(
        &ctx.pool,
        &ctx.config.vocabulary,
        &ctx.config.identifiers,
        options,
    );
    let summary = importer
        .import_file(&args.csv_file)
        .await
        .with_context(|| format!("Failed to import {}", args.csv_file.display()))?;

    println!("{}", summary);
    Ok(())
}

async fn sync_mechanisms(ctx: &AppContext) -> Result<()> {
    let mut tx = ctx.pool.begin().await?;
    let report = sync_all_mechanisms(&mut SqliteRepository::new(&mut tx)).await?;
    tx.commit().await?;

    println!("Statuses reset: {}", report.statuses_reset);
    println!("Mechanisms updated: {}", report.mechanisms_updated);
    if report.mechanisms_failed > 0 {
        println!("Mechanisms failed: {}", report.mechanisms_failed);
    }
    Ok(())
}

async fn report(ctx: &AppContext, project: Option<&str>, json: bool) -> Result<()> {
    let mut conn = ctx.pool.acquire().await?;
    let mut repo = SqliteRepository::new(&mut conn);

    let project = match project {
        Some(name) => {
            let p = require_project(&mut repo, name).await?;
            Some((p.id, p.name))
        }
        None => None,
    };
    let dashboard = build_dashboard(&mut repo, project, today()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
    } else {
        output::print_dashboard(&dashboard);
    }
    Ok(())
}

async fn export(ctx: &AppContext, args: ExportArgs) -> Result<()> {
    let mut conn = ctx.pool.acquire().await?;
    let mut repo = SqliteRepository::new(&mut conn);

    let project_id = match &args.project {
        Some(name) => Some(require_project(&mut repo, name).await?.id),
        None => None,
    };
    let filter = ObligationFilter {
        project_id,
        mechanism_id: None,
        status: args.status,
        environmental_aspect: args.aspect,
        due_from: args.due_from,
        due_to: args.due_to,
    };

    let count = match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let count = export_obligations(&mut repo, &filter, file).await?;
            info!("Wrote {} obligations to {}", count, path.display());
            count
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            let count = export_obligations(&mut repo, &filter, &mut handle).await?;
            handle.flush()?;
            count
        }
    };

    if args.output.is_some() {
        println!("Exported {} obligations", count);
    }
    Ok(())
}

async fn obligation(ctx: &AppContext, cmd: ObligationCommand) -> Result<()> {
    let service = service(ctx);

    match cmd {
        ObligationCommand::Submit { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let form: ObligationForm = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            match service.submit(&form).await {
                Ok((ob, outcome)) => {
                    println!("{} {:?}", ob.obligation_number, outcome);
                    Ok(())
                }
                Err(Error::Validation(errors)) => {
                    output::print_field_errors(&errors);
                    bail!("obligation rejected with {} error(s)", errors.len())
                }
                Err(e) => Err(e.into()),
            }
        }
        ObligationCommand::SetStatus {
            obligation_number,
            status,
            close_out_date,
        } => {
            match service
                .set_status(&obligation_number, &status, close_out_date)
                .await
            {
                Ok(ob) => {
                    println!("{} is now {}", ob.obligation_number, ob.status);
                    Ok(())
                }
                Err(Error::Validation(errors)) => {
                    output::print_field_errors(&errors);
                    bail!("status change rejected")
                }
                Err(e) => Err(e.into()),
            }
        }
        ObligationCommand::Reassign {
            obligation_number,
            mechanism,
        } => {
            let ob = service
                .reassign(&obligation_number, mechanism.as_deref())
                .await?;
            println!(
                "{} reassigned to {}",
                ob.obligation_number,
                mechanism.as_deref().unwrap_or("no mechanism")
            );
            Ok(())
        }
        ObligationCommand::Delete { obligation_number } => {
            let ob = service.delete(&obligation_number).await?;
            println!("Deleted {}", ob.obligation_number);
            Ok(())
        }
    }
}

async fn project(ctx: &AppContext, cmd: ProjectCommand) -> Result<()> {
    match cmd {
        ProjectCommand::List => {
            let mut conn = ctx.pool.acquire().await?;
            let projects = SqliteRepository::new(&mut conn).list_projects().await?;
            output::print_projects(&projects);
        }
        ProjectCommand::Create { name, description } => {
            let project = service(ctx)
                .create_project(&name, description.as_deref())
                .await?;
            println!("Created project '{}' (id {})", project.name, project.id);
        }
        ProjectCommand::AddMember {
            project,
            user,
            role,
        } => {
            let membership = service(ctx).add_member(&project, &user, role).await?;
            println!("{} is {} of '{}'", membership.user_name, membership.role, project);
        }
        ProjectCommand::Members { project } => {
            let mut conn = ctx.pool.acquire().await?;
            let mut repo = SqliteRepository::new(&mut conn);
            let p = require_project(&mut repo, &project).await?;
            for m in repo.list_memberships(p.id).await? {
                println!("{:<24} {}", m.user_name, m.role);
            }
        }
    }
    Ok(())
}

async fn mechanism(ctx: &AppContext, cmd: MechanismCommand) -> Result<()> {
    match cmd {
        MechanismCommand::List { project } => {
            let mut conn = ctx.pool.acquire().await?;
            let mut repo = SqliteRepository::new(&mut conn);
            let project_id = match &project {
                Some(name) => Some(require_project(&mut repo, name).await?.id),
                None => None,
            };
            let mechanisms = repo.list_mechanisms(project_id).await?;
            output::print_mechanisms(&mechanisms);
        }
        MechanismCommand::Add { project, name } => {
            let m = service(ctx).create_mechanism(&project, &name).await?;
            println!("Created mechanism '{}' (id {})", m.name, m.id);
        }
    }
    Ok(())
}
