use crate::commands::Context;
use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::Colorize;
use lk_core::broker::{BrokerOptions, MessageBroker};
use lk_protocol::message_models::MessageType;
use serde_json::Value;

/// Send one message and print its id.
pub fn send(ctx: &Context, message_type: &str, payload: &str, channel: Option<String>) -> Result<()> {
    let message_type: MessageType = message_type.parse().map_err(|err: String| eyre!(err))?;
    let payload: Value = serde_json::from_str(payload).wrap_err("payload is not valid JSON")?;

    let broker = MessageBroker::for_channel(
        &ctx.locator,
        &ctx.channel(channel),
        BrokerOptions::default(),
    )?;
    let id = broker.send(message_type, payload)?;

    println!("{id}");
    Ok(())
}

/// Consume messages on a channel until Ctrl-C.
pub async fn watch(ctx: &Context, channel: Option<String>) -> Result<()> {
    let broker = MessageBroker::for_channel(
        &ctx.locator,
        &ctx.channel(channel),
        BrokerOptions {
            fail_on_handler_error: ctx.config.settings.broker.fail_on_handler_error,
        },
    )?;

    println!(
        "{} {} (Ctrl-C to stop)",
        "watching".bold(),
        broker.dir().display()
    );
    broker.on_any(|message| {
        println!(
            "{} {} {}",
            message.message_type.to_string().cyan(),
            message.id.to_string().dimmed(),
            message.payload
        );
        Ok(())
    })?;
    broker.process_pending()?;

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for Ctrl-C")?;
    broker.dispose();
    Ok(())
}
