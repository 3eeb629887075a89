use batchwise_core::{Action, ItemOutcome, Payload};

/// Shape of a remote call: one bulk request or one single-item request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Bulk,
    Single,
}

impl CallKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Single => "single",
        }
    }
}

/// Context carried with every store call through the pipeline.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: u64,
    pub action: Action,
    pub target_type: String,
    pub call_timeout_ms: u64,
}

/// A request to the remote store, dispatched through the call pipeline.
#[derive(Debug, Clone)]
pub enum StoreCall {
    Bulk { ctx: CallContext, items: Vec<Payload> },
    Single { ctx: CallContext, item: Payload },
}

impl StoreCall {
    #[must_use]
    pub fn ctx(&self) -> &CallContext {
        match self {
            Self::Bulk { ctx, .. } | Self::Single { ctx, .. } => ctx,
        }
    }

    #[must_use]
    pub fn kind(&self) -> CallKind {
        match self {
            Self::Bulk { .. } => CallKind::Bulk,
            Self::Single { .. } => CallKind::Single,
        }
    }

    /// Number of items carried by the call.
    #[must_use]
    pub fn item_count(&self) -> usize {
        match self {
            Self::Bulk { items, .. } => items.len(),
            Self::Single { .. } => 1,
        }
    }
}

/// Reply from the store, shaped like the call that produced it.
#[derive(Debug)]
pub enum StoreReply {
    /// Index-aligned outcomes for a bulk call.
    Bulk(Vec<ItemOutcome>),
    Single(ItemOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext {
            call_id: 7,
            action: Action::Create,
            target_type: "contacts".to_string(),
            call_timeout_ms: 1000,
        }
    }

    #[test]
    fn bulk_call_reports_len_and_kind() {
        let call = StoreCall::Bulk {
            ctx: ctx(),
            items: vec![Payload::default(), Payload::default()],
        };
        assert_eq!(call.kind(), CallKind::Bulk);
        assert_eq!(call.item_count(), 2);
        assert_eq!(call.ctx().call_id, 7);
    }

    #[test]
    fn single_call_has_one_item() {
        let call = StoreCall::Single {
            ctx: ctx(),
            item: Payload::default(),
        };
        assert_eq!(call.kind().as_str(), "single");
        assert_eq!(call.item_count(), 1);
    }
}
