//! CLI `ask` command: run the research agent and print a cited answer.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use sutta_agent::agent::{progress_channel, Phase};
use sutta_agent::config::SuttaConfig;
use sutta_agent::context::AppContext;

pub async fn ask(config: SuttaConfig, question: &str, model: Option<&str>, json: bool) -> Result<()> {
    let ctx = AppContext::open(config)?;
    let agent = ctx.build_agent(model)?;

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("valid template"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    let (callback, mut events) = progress_channel();
    agent.set_progress_callback(callback);

    let pb = spinner.clone();
    let render = tokio::spawn(async move {
        while let Some(progress) = events.recv().await {
            if progress.phase == Phase::Complete {
                pb.finish_and_clear();
                break;
            }
            pb.set_message(format!(
                "{} (Step {}/{})",
                progress.message, progress.iteration, progress.max_iterations
            ));
        }
    });

    let result = agent.research(question).await;
    render.abort();
    spinner.finish_and_clear();
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.answer_text);
    println!();
    if response.from_memory {
        println!("(recalled from memory)");
    } else {
        println!(
            "({} search round(s), {} passage(s) considered)",
            response.iterations, response.evidence_count
        );
    }

    if !response.citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, citation) in response.citations.iter().enumerate() {
            println!(
                "  {}. {} ({}, {})",
                i + 1,
                citation.title,
                citation.sutta_uid,
                citation.segment_range
            );
            println!("     {}", citation.text_snippet.replace('\n', " "));
        }
    }

    Ok(())
}
