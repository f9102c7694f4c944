use std::io::{self, Write};
use std::sync::atomic::Ordering;

use agent_chat::{
    init_tracing, parse_command, transport_for_config, ChatTransport, Command, EnvConfig,
    PlainTextSink, HELP_TEXT,
};
use conversation::{Conversation, ConversationConfig, SendError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = EnvConfig::from_env().map_err(io::Error::other)?;
    init_tracing(config.log_filter.as_deref());

    let transport = transport_for_config(&config).map_err(io::Error::other)?;
    info!(transport = transport.kind().as_str(), "starting chat");

    let mut conversation = Conversation::new(transport, ConversationConfig::default());
    let mut sink = PlainTextSink::new(io::stdout(), config.show_system);

    let cancel = conversation.cancel_signal();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::Release);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP_TEXT}"),
            Command::Unknown(name) => eprintln!("unknown command '/{name}', try /help"),
            Command::History => match conversation.load_history(&mut sink).await {
                Ok(0) => println!("(no stored messages)"),
                Ok(_) => {}
                Err(error) => eprintln!("error: {error}"),
            },
            Command::Agents => list_agents(&conversation).await,
            Command::Send(text) => match conversation.send_message(&text, &mut sink).await {
                Ok(outcome) => {
                    if outcome.rate_limited {
                        warn!("send was rate limited");
                    }
                }
                Err(SendError::Cancelled) => eprintln!("(cancelled)"),
                Err(error) => eprintln!("error: {error}"),
            },
        }
    }

    conversation.teardown(&mut sink);
    Ok(())
}

async fn list_agents(conversation: &Conversation<ChatTransport>) {
    match conversation.list_agents().await {
        Ok(agents) if agents.is_empty() => println!("(no agents)"),
        Ok(agents) => {
            for agent in agents {
                let name = agent.name.as_deref().unwrap_or("unnamed");
                match agent.model.as_deref() {
                    Some(model) => println!("{}  {name}  [{model}]", agent.id),
                    None => println!("{}  {name}", agent.id),
                }
            }
        }
        Err(error) => eprintln!("error: {error}"),
    }
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}
