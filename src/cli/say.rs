//! TUI-less "say" command

use std::error::Error;

use tokio_util::sync::CancellationToken;

use crate::cli::{start_session, Overrides};
use crate::core::downloads::download_files;
use crate::core::message::ChatMessage;
use crate::core::session::SessionEvent;

pub async fn run_say(prompt: Vec<String>, overrides: &Overrides) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: palaver say <prompt>");
        std::process::exit(1);
    }

    let mut started = start_session(overrides).await?;
    let session = started.session.clone();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let messages = match session.send(&prompt, &cancel).await {
        Ok(messages) => messages,
        Err(err) => {
            eprintln!("❌ Error: {err}");
            std::process::exit(1);
        }
    };

    while let Ok(event) = started.events.try_recv() {
        if let SessionEvent::ToolCalls(calls) = event {
            for call in calls {
                eprintln!("🔧 {}({}) → {}", call.name, call.arguments, call.output);
            }
        }
    }

    print_messages(&messages);

    let files: Vec<_> = messages.iter().flat_map(ChatMessage::downloads).collect();
    for (file, result) in download_files(session.api().as_ref(), &files, &started.download_dir).await
    {
        match result {
            Ok(path) => eprintln!("💾 Saved {} to {}", file.filename, path.display()),
            Err(err) => eprintln!("⚠️  Could not save {}: {err}", file.filename),
        }
    }

    Ok(())
}

fn print_messages(messages: &[ChatMessage]) {
    for message in messages {
        println!("{}", message.content);
    }
}
