//! Subcommand implementations.

use anyhow::{Context, Result};
use courier::model::{NewNotification, Notification, NotificationUpdate};
use courier::service::NotificationService;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct RecentOutput<'a> {
    notifications: &'a [Notification],
    total: usize,
}

#[derive(Serialize)]
struct DeleteOutput {
    id: i64,
    deleted: bool,
}

pub async fn create(
    service: &NotificationService,
    kind: &str,
    recipient: String,
    subject: Option<String>,
    content: String,
    format: OutputFormat,
) -> Result<bool> {
    let new = NewNotification::parse(kind, recipient, subject, content)?;
    let created = service
        .create(new)
        .await
        .context("failed to create notification")?;
    print_one(&created, format)?;
    Ok(true)
}

pub async fn get(service: &NotificationService, id: i64, format: OutputFormat) -> Result<bool> {
    match service.get_by_id(id).await? {
        Some(notification) => {
            print_one(&notification, format)?;
            Ok(true)
        }
        None => {
            eprintln!("Notification {id} not found.");
            Ok(false)
        }
    }
}

pub async fn recent(service: &NotificationService, format: OutputFormat) -> Result<bool> {
    let notifications = service.get_recent().await?;

    match format {
        OutputFormat::Text => {
            if notifications.is_empty() {
                println!("No notifications found.");
            } else {
                println!(
                    "{:>8} {:<6} {:<32} {:<32} {:>15}",
                    "ID", "TYPE", "RECIPIENT", "SUBJECT", "CREATED AT"
                );
                println!("{}", "-".repeat(97));
                for n in &notifications {
                    println!(
                        "{:>8} {:<6} {:<32} {:<32} {:>15}",
                        n.id,
                        n.kind,
                        truncate(&n.recipient, 32),
                        truncate(n.subject.as_deref().unwrap_or("-"), 32),
                        n.created_at
                    );
                }
                println!();
                println!("Total: {} notification(s)", notifications.len());
            }
        }
        OutputFormat::Json => {
            let output = RecentOutput {
                notifications: &notifications,
                total: notifications.len(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(true)
}

pub async fn update(
    service: &NotificationService,
    id: i64,
    subject: Option<String>,
    content: String,
    format: OutputFormat,
) -> Result<bool> {
    let update = NotificationUpdate::new(subject, content)?;
    match service.update(id, update).await? {
        Some(updated) => {
            print_one(&updated, format)?;
            Ok(true)
        }
        None => {
            eprintln!("Notification {id} not found.");
            Ok(false)
        }
    }
}

pub async fn delete(service: &NotificationService, id: i64, format: OutputFormat) -> Result<bool> {
    let deleted = service.delete(id).await?;
    match format {
        OutputFormat::Text if deleted => println!("Deleted notification {id}."),
        OutputFormat::Text => eprintln!("Notification {id} not found."),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&DeleteOutput { id, deleted })?);
        }
    }
    Ok(deleted)
}

fn print_one(notification: &Notification, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("ID:         {}", notification.id);
            println!("Type:       {}", notification.kind);
            println!("Recipient:  {}", notification.recipient);
            println!(
                "Subject:    {}",
                notification.subject.as_deref().unwrap_or("-")
            );
            println!("Content:    {}", notification.content);
            println!("Created at: {}", notification.created_at);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(notification)?);
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
