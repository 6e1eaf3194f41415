use std::env;
use std::error::Error;

use tirc::{ClientConfigBuilder, Event, EventKind, TwitchIrcClient};

#[macro_use]
extern crate log;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = ClientConfigBuilder::default()
        .nick(env::var("TWITCH_USERNAME")?)
        .token(env::var("TWITCH_AUTH")?)
        .debug_events(false)
        .build()?;
    let mut channel = env::var("TWITCH_CHANNEL").unwrap_or_else(|_| "forsen".to_string());
    if !channel.starts_with('#') {
        channel.insert(0, '#');
    }

    let client = TwitchIrcClient::new(config);
    client.on(EventKind::Error, |event: &Event| {
        if let Event::Error(err) = event {
            error!("{}: {}", err.message, err.error);
        }
        Ok(())
    });
    client.on(EventKind::Notice, |event: &Event| {
        info!("{:?}", event);
        Ok(())
    });

    let replier = client.clone();
    client.on(EventKind::Message, move |event: &Event| {
        if let Event::Message(msg) = event {
            let sender = msg.tags.display_name().unwrap_or("someone");
            info!("[{}] {}: {}", msg.channel, sender, msg.message);
            if msg.message.trim() == "!hello" {
                replier.send_message(&msg.channel, &format!("Hello {}!", sender))?;
            }
        }
        Ok(())
    });

    client.join(channel.as_str()).await?;
    tokio::signal::ctrl_c().await?;
    client.leave_all()?;
    client.close();
    Ok(())
}
