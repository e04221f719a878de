pub mod ask;
pub mod chat;
pub mod corpus;

use mneme::agent::{TurnResult, TurnStatus};

/// Print a turn result the way `ask` and `chat` show it.
pub fn print_turn(result: &TurnResult, verbose: bool) {
    println!("{}", result.response);

    if !result.citations.is_empty() {
        println!();
        println!("Sources:");
        for citation in &result.citations {
            println!("  - {citation}");
        }
    }

    if result.partial {
        println!();
        println!("(some knowledge sources were unavailable; the answer may be incomplete)");
    }

    println!();
    println!(
        "[intent: {}  steps: {}]",
        result.intent, result.reasoning_steps_used
    );
    if verbose || result.status == TurnStatus::Failed {
        println!("[status: {:?}  turn: {}]", result.status, result.turn_id);
        if !result.entities.is_empty() {
            println!("[entities: {}]", result.entities.join(", "));
        }
    }
}
