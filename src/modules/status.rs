//! Runtime introspection commands.

use crate::commands::{HandlerResult, Module};
use crate::context::Context;
use crate::event::{DispatchOutcome, Event};

use super::elapsed;

pub fn module() -> Module {
    Module::new("status")
        .command("cmd", cmd)
        .command("flt", flt)
        .command("met", met)
        .command("mod", modules)
        .command("thr", thr)
        .command("upt", upt)
}

fn name(event: &Event) -> String {
    format!("{}#{}", event.cmd(), event.id())
}

fn state(event: &Event) -> String {
    match event.outcome() {
        None => "running".to_string(),
        Some(DispatchOutcome::Ok) => "ok".to_string(),
        Some(DispatchOutcome::Miss) => "miss".to_string(),
        Some(DispatchOutcome::Failed { cause }) => format!("failed: {}", cause),
    }
}

/// List registered commands.
fn cmd(ctx: &Context, event: &Event) -> HandlerResult {
    event.reply(ctx.commands.names().join(","));
    Ok(())
}

/// `flt <index>` shows one recent event, `flt` lists them all.
fn flt(ctx: &Context, event: &Event) -> HandlerResult {
    if let Some(found) = event
        .args()
        .first()
        .and_then(|arg| arg.parse::<usize>().ok())
        .and_then(|index| ctx.event(index))
    {
        event.reply(format!("{} {} {}", name(&found), found.txt(), state(&found)));
        return Ok(());
    }
    let names: Vec<String> = ctx.events().iter().map(|e| name(e)).collect();
    event.reply(names.join(" | "));
    Ok(())
}

fn met(ctx: &Context, event: &Event) -> HandlerResult {
    let metrics = ctx.metrics();
    event.reply(serde_json::to_string(&metrics)?);
    Ok(())
}

fn modules(ctx: &Context, event: &Event) -> HandlerResult {
    event.reply(ctx.commands.modules().join(","));
    Ok(())
}

/// Commands still running, shortest-running first.
fn thr(ctx: &Context, event: &Event) -> HandlerResult {
    let mut running: Vec<(u64, String)> = ctx
        .running()
        .iter()
        .map(|e| (e.elapsed().as_secs(), e.cmd().to_string()))
        .collect();
    if running.is_empty() {
        event.reply("no commands running");
        return Ok(());
    }
    running.sort();
    let parts: Vec<String> = running
        .into_iter()
        .map(|(secs, cmd)| format!("{}/{}", cmd, elapsed(secs)))
        .collect();
    event.reply(parts.join(" "));
    Ok(())
}

fn upt(ctx: &Context, event: &Event) -> HandlerResult {
    event.reply(elapsed(ctx.uptime().as_secs()));
    Ok(())
}
