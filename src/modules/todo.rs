use chrono::Utc;

use crate::commands::{HandlerResult, Module};
use crate::context::Context;
use crate::error::DecodeError;
use crate::event::Event;
use crate::object::{require_text, Kind, Object};
use crate::store::fntime;

use super::elapsed;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Todo {
    pub txt: String,
}

impl Kind for Todo {
    const KIND: &'static str = "opbot.todo.Todo";

    fn template() -> Object {
        Todo::default().into_object()
    }

    fn from_object(obj: &Object) -> Result<Self, DecodeError> {
        Ok(Self {
            txt: require_text(obj, "txt")?,
        })
    }

    fn into_object(self) -> Object {
        let mut obj = Object::with_kind(Self::KIND);
        obj.set("txt", self.txt);
        obj
    }
}

pub fn module() -> Module {
    Module::new("todo").kind::<Todo>().command("tdo", tdo)
}

/// `tdo <text>` stores a todo; `tdo` lists stored ones with their age.
fn tdo(ctx: &Context, event: &Event) -> HandlerResult {
    if event.rest().is_empty() {
        let now = Utc::now();
        let query = ctx.store.find("todo", None)?;
        for (nr, obj) in query.iter().enumerate() {
            let obj = obj?;
            let todo = Todo::from_object(&obj)?;
            let age = obj
                .origin()
                .and_then(fntime)
                .map(|t| (now - t).num_seconds().max(0) as u64)
                .unwrap_or(0);
            event.reply(format!("{} {} {}", nr, todo.txt, elapsed(age)));
        }
        return Ok(());
    }
    let mut obj = Todo {
        txt: event.rest().to_string(),
    }
    .into_object();
    ctx.store.save(&mut obj)?;
    event.reply("ok");
    Ok(())
}
