use anyhow::Result;

use mneme::agent::TurnStatus;
use mneme::config::MnemeConfig;

/// Run a single turn and print the answer. Ctrl-C abandons the turn.
pub async fn ask(config: &MnemeConfig, query: &str, json: bool, verbose: bool) -> Result<()> {
    anyhow::ensure!(!query.trim().is_empty(), "query must not be empty");

    let agent = crate::server::build_agent(config)?;

    let cancel = async {
        // If the signal handler cannot be installed, run the turn to completion.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let Some(result) = agent.run_turn_until(query, Vec::new(), cancel).await else {
        eprintln!("Cancelled.");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        super::print_turn(&result, verbose);
    }

    anyhow::ensure!(
        result.status == TurnStatus::Answered,
        "the language model failed while reasoning"
    );
    Ok(())
}
