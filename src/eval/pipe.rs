//! Pipe operator dispatch (spec.md §4.2 "Pipe operator").

use std::sync::Arc;

use crate::error::{EvalError, RuntimeError};
use crate::runtime::Runtime;
use crate::value::{ChatMessage, Conversation, Value};

use crate::engine;

/// `L | R`, dispatched on the runtime type of both operands. Left-
/// associative by construction — the parser nests `Pipe` nodes so this
/// function only ever sees one stage at a time.
pub async fn eval_pipe(rt: &Arc<Runtime>, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match (&left, &right) {
        (Value::String(_), Value::Agent(agent)) => {
            let conversation = Conversation::with_user_message(left.string());
            engine::execute_agent(rt, conversation, agent.clone()).await
        }
        (Value::Conversation(_), Value::String(text)) => {
            let Value::Conversation(conversation) = left else {
                unreachable!()
            };
            let mut updated = conversation.read().expect("conversation lock poisoned").clone();
            updated.push(ChatMessage::user(text.clone()));
            Ok(Value::conversation(updated))
        }
        (Value::Conversation(conversation), Value::Agent(agent)) => {
            let conversation = conversation.read().expect("conversation lock poisoned").clone();
            engine::execute_agent(rt, conversation, agent.clone()).await
        }
        _ => Err(EvalError::BadPipe {
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        }
        .into()),
    }
}
