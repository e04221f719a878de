use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use mneme::agent::{Message, TurnStatus};
use mneme::config::MnemeConfig;

/// Interactive loop. The CLI owns the conversation and resends it each turn.
///
/// `/reset` clears the conversation, `/exit` or end of input quits. Ctrl-C
/// abandons the current turn without recording it.
pub async fn chat(config: &MnemeConfig, verbose: bool) -> Result<()> {
    let agent = crate::server::build_agent(config)?;
    let window = config.agent.history_window;

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask about your knowledge base. /reset clears the conversation, /exit quits.");
    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let query = line.trim();
        match query {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                history.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let cancel = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let Some(result) = agent.run_turn_until(query, history.clone(), cancel).await else {
            println!("\n(cancelled)");
            continue;
        };

        println!();
        super::print_turn(&result, verbose);
        println!();

        if result.status == TurnStatus::Answered {
            history.push(Message::user(query));
            history.push(Message::assistant(result.response));
            let excess = history.len().saturating_sub(window);
            history.drain(..excess);
        }
    }

    Ok(())
}
