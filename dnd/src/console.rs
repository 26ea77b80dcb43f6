//! Terminal front-end.
//!
//! Prints everything the game narrates and, when a human seat is up, reads
//! one line from stdin:
//! - `#quit` stops the game after the last committed round
//! - `#status` shows the party again
//! - anything else is the character's action

use dnd_core::frontend::{ClientMessage, FrontendClient, ServerMessage, StateSnapshot};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

pub fn spawn(mut client: FrontendClient) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();

        while let Some(message) = client.inbound.recv().await {
            match message {
                ServerMessage::Narration { speaker, text } => {
                    println!("[{speaker}] {text}\n");
                }
                ServerMessage::State {
                    snapshot,
                    awaiting_input,
                    prompt,
                } => {
                    print_status(&snapshot);
                    if !awaiting_input {
                        continue;
                    }
                    let reply = read_action(&mut stdin, &snapshot, prompt.as_deref()).await;
                    if client.outbound.send(reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

async fn read_action<R>(
    stdin: &mut tokio::io::Lines<R>,
    snapshot: &StateSnapshot,
    prompt: Option<&str>,
) -> ClientMessage
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        print!("{} > ", prompt.unwrap_or("Your action"));
        let _ = tokio::io::stdout().flush().await;

        let line = match stdin.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return ClientMessage::Quit,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                return ClientMessage::Quit;
            }
        };

        match line.trim() {
            "" => continue,
            "#quit" | "#exit" => return ClientMessage::Quit,
            "#status" => print_status(snapshot),
            "#help" => {
                println!("  #quit    - Stop after the last completed round");
                println!("  #status  - Show the party");
                println!("  anything else is your action");
            }
            text => {
                return ClientMessage::Input {
                    text: text.to_string(),
                }
            }
        }
    }
}

fn print_status(snapshot: &StateSnapshot) {
    println!("=== {} - round {} ===", snapshot.campaign, snapshot.round);
    println!("Location: {}", snapshot.location);
    for member in &snapshot.party {
        let status: Vec<String> = member
            .status
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        if status.is_empty() {
            println!("  {} ({})", member.name, member.summary);
        } else {
            println!("  {} ({}) [{}]", member.name, member.summary, status.join(", "));
        }
    }
    println!();
}
