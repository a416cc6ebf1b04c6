//! Text rendering for command output

use anyhow::Result;
use greenova_common::analytics::{Dashboard, UPCOMING_DAYS};
use greenova_common::{FieldErrors, Mechanism, Obligation, Project};

pub fn print_dashboard(dashboard: &Dashboard) {
    let m = &dashboard.metrics;
    match &dashboard.project {
        Some(name) => println!("Project: {}", name),
        None => println!("All projects"),
    }
    println!("As of {}", dashboard.today);
    println!();
    println!(
        "Obligations: {} total, {} not started, {} in progress, {} completed ({:.1}% complete)",
        m.total, m.not_started, m.in_progress, m.completed, m.completion_rate
    );
    println!(
        "Overdue: {}   Due in the next {} days: {}",
        dashboard.overdue, UPCOMING_DAYS, dashboard.upcoming
    );

    if !dashboard.mechanisms.is_empty() {
        println!();
        println!(
            "{:<32} {:>11} {:>11} {:>9} {:>7}  Status",
            "Mechanism", "Not started", "In progress", "Completed", "Overdue"
        );
        for row in &dashboard.mechanisms {
            let mech = &row.mechanism;
            println!(
                "{:<32} {:>11} {:>11} {:>9} {:>7}  {}",
                mech.name,
                mech.not_started_count,
                mech.in_progress_count,
                mech.completed_count,
                row.overdue,
                mech.status
            );
        }
    }

    if !dashboard.aspects.is_empty() {
        println!();
        println!("By aspect:");
        for (aspect, count) in &dashboard.aspects {
            println!("  {:<28} {}", aspect, count);
        }
    }
}

pub fn print_obligations(obligations: &[Obligation], heading: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(obligations)?);
        return Ok(());
    }

    println!("{} obligation(s) {}", obligations.len(), heading);
    for ob in obligations {
        let due = ob
            .action_due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<14} {:<10} {:<12} {}",
            ob.obligation_number, due, ob.status, ob.obligation
        );
    }
    Ok(())
}

pub fn print_projects(projects: &[Project]) {
    for p in projects {
        match &p.description {
            Some(desc) => println!("{:>4}  {}  ({})", p.id, p.name, desc),
            None => println!("{:>4}  {}", p.id, p.name),
        }
    }
}

pub fn print_mechanisms(mechanisms: &[Mechanism]) {
    for m in mechanisms {
        println!(
            "{:>4}  {:<32} {:<12} {}/{}/{} (not started/in progress/completed)",
            m.id,
            m.name,
            m.status,
            m.not_started_count,
            m.in_progress_count,
            m.completed_count
        );
    }
}

pub fn print_field_errors(errors: &FieldErrors) {
    eprintln!("Validation failed:");
    for (field, message) in errors.iter() {
        eprintln!("  {}: {}", field, message);
    }
}
