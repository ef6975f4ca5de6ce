use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

use super::{SimulationReport, UserReport};

pub fn generate_console_report(
    out: &mut dyn Write,
    reports: &[SimulationReport],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Simulation Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "=====================".cyan())?;

    let total_runs = reports.len();
    let passed_runs = reports.iter().filter(|r| r.passed).count();
    writeln!(out, "Runs: {total_runs}")?;
    writeln!(out, "Passed: {}", passed_runs.to_string().green())?;
    writeln!(
        out,
        "Failed: {}",
        (total_runs - passed_runs).to_string().red()
    )?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for report in reports {
        let status = if report.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(
            out,
            "{} {} (seed {}, {} builds, {} events)",
            status,
            report.scenario.bold(),
            report.seed,
            report.builds,
            report.total_events
        )?;

        for user in &report.users {
            write_user(out, user)?;
        }

        if !report.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &report.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    if let Some(best) = reports
        .iter()
        .flat_map(|report| report.users.iter())
        .max_by_key(|user| user.score)
    {
        writeln!(out, "{}", "🏆 Leaderboard".bright_yellow().bold())?;
        writeln!(out, "{}", "==============".yellow())?;
        writeln!(
            out,
            "Top score: {} ({} points)",
            best.user.green(),
            best.score
        )?;
    }

    Ok(())
}

fn write_user(out: &mut dyn Write, user: &UserReport) -> Result<()> {
    let totals = &user.totals;
    writeln!(
        out,
        "   {} - {} points",
        user.user.bright_white(),
        user.score
    )?;
    writeln!(
        out,
        "     Quests: {} generated, {} solved, {} rejected",
        totals.quests_generated, totals.quests_solved, totals.quests_rejected
    )?;
    writeln!(
        out,
        "     Quest tasks: {} generated, {} solved",
        totals.quest_tasks_generated, totals.quest_tasks_solved
    )?;
    for task in &user.current_quest_tasks {
        writeln!(out, "       ◦ {} ({}%)", task.title, task.percentage)?;
    }
    writeln!(
        out,
        "     Achievements: {}, badges: {}, progress steps: {}",
        user.achievements.len(),
        totals.badges_earned,
        totals.progress_made
    )?;
    for achievement in &user.achievements {
        writeln!(
            out,
            "       ★ {} - {}",
            achievement.title.yellow(),
            achievement.solved
        )?;
    }
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, reports: &[SimulationReport]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, reports)?;
    writeln!(out)?;
    Ok(())
}
