//! Property tests checking the frozen registry against a simple sequential model.

use std::collections::HashSet;

use proptest::prelude::*;
use switchyard::prelude::*;

const MESSAGE_TYPES: [&str; 3] = ["Created", "Updated", "Deleted"];

#[derive(Clone, Debug)]
struct Spec {
    id: String,
    category: MessageCategory,
    node_kind: NodeKind,
    types: Vec<&'static str>,
    override_types: Option<Vec<&'static str>>,
}

impl Spec {
    /// The message types the registry routes this handler by.
    fn effective_types(&self) -> &[&'static str] {
        self.override_types.as_deref().unwrap_or(&self.types)
    }
}

#[derive(Clone, Debug)]
enum Op {
    Register(Spec),
    Unregister(String),
}

impl HandlerDescriptor for Spec {
    fn handler_id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> MessageCategory {
        self.category
    }

    fn node_kind(&self) -> NodeKind {
        self.node_kind
    }

    fn message_types(&self) -> MessageTypes {
        self.types.iter().copied().collect()
    }
}

impl Handler for Spec {
    fn handle<'a>(&'a self, _envelope: &'a Envelope) -> BoxFuture<'a, HandlerResult> {
        async move { Ok(HandlerOutput::none()) }.boxed()
    }
}

fn id_strategy() -> impl Strategy<Value = String> {
    // A small pool so duplicates and re-registrations happen often.
    (0..8_u8).prop_map(|i| format!("handler-{i}"))
}

fn types_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(MESSAGE_TYPES.to_vec(), 0..=MESSAGE_TYPES.len())
}

fn spec_strategy() -> impl Strategy<Value = Spec> {
    (
        id_strategy(),
        prop::sample::select(MessageCategory::ALL.to_vec()),
        prop::sample::select(NodeKind::ALL.to_vec()),
        types_strategy(),
        prop::option::of(types_strategy()),
    )
        .prop_map(|(id, category, node_kind, types, override_types)| Spec {
            id,
            category,
            node_kind,
            types,
            override_types,
        })
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => spec_strategy().prop_map(Op::Register),
        1 => id_strategy().prop_map(Op::Unregister),
    ]
}

/// Replays `ops` against a fresh registry and against a plain vector, returning both.
fn replay(ops: &[Op]) -> (HandlerRegistry, Vec<Spec>) {
    let policy = ShapePolicy::standard();
    let registry = HandlerRegistry::new();
    let mut model: Vec<Spec> = Vec::new();

    for op in ops {
        match op {
            Op::Register(spec) => {
                let result = match &spec.override_types {
                    Some(types) => registry.register_with_message_types(
                        spec.clone(),
                        types.iter().copied().collect::<MessageTypes>(),
                    ),
                    None => registry.register(spec.clone()),
                };
                let allowed = policy.is_allowed(spec.category, spec.node_kind);
                let duplicate = model.iter().any(|other| other.id == spec.id);
                match result {
                    Ok(_) => {
                        assert!(allowed && !duplicate);
                        model.push(spec.clone());
                    }
                    Err(RegistryError::ValidationFailed { .. }) => assert!(!allowed),
                    Err(RegistryError::DuplicateRegistration { .. }) => {
                        assert!(allowed && duplicate)
                    }
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
            Op::Unregister(id) => {
                let removed = registry.unregister(id).unwrap();
                let position = model.iter().position(|spec| &spec.id == id);
                assert_eq!(removed, position.is_some());
                if let Some(position) = position {
                    model.remove(position);
                }
            }
        }
    }

    registry.freeze();
    (registry, model)
}

fn accepts(spec: &Spec, message_type: Option<&str>) -> bool {
    match message_type {
        None => true,
        Some(message_type) => {
            let types = spec.effective_types();
            types.is_empty() || types.contains(&message_type)
        }
    }
}

proptest! {
    #[test]
    fn lookup_matches_model(ops in prop::collection::vec(op_strategy(), 0..48)) {
        let (registry, model) = replay(&ops);

        let queries = [None, Some("Created"), Some("Updated"), Some("Deleted"), Some("Unknown")];
        for category in MessageCategory::ALL {
            for message_type in queries {
                let found: Vec<_> = registry
                    .lookup(category, message_type)
                    .unwrap()
                    .into_iter()
                    .map(RegistryEntry::handler_id)
                    .collect();
                let expected: Vec<_> = model
                    .iter()
                    .filter(|spec| spec.category == category && accepts(spec, message_type))
                    .map(|spec| spec.id.as_str())
                    .collect();
                prop_assert_eq!(found, expected);
            }
        }
    }

    #[test]
    fn lookup_never_returns_non_accepting_handlers(
        ops in prop::collection::vec(op_strategy(), 0..48),
        message_type in prop::sample::select(vec!["Created", "Updated", "Deleted", "Unknown"]),
    ) {
        let (registry, _) = replay(&ops);

        for category in MessageCategory::ALL {
            for entry in registry.lookup(category, Some(message_type)).unwrap() {
                prop_assert_eq!(entry.category(), category);
                prop_assert!(entry.message_types().accepts(message_type));
                prop_assert!(ShapePolicy::standard().is_allowed(entry.category(), entry.node_kind()));
            }
        }
    }

    #[test]
    fn every_registered_id_is_retrievable(ops in prop::collection::vec(op_strategy(), 0..48)) {
        let (registry, model) = replay(&ops);

        prop_assert_eq!(registry.handler_count(), model.len());
        for spec in &model {
            let entry = registry.lookup_by_id(&spec.id).unwrap();
            prop_assert!(entry.is_some());
            let entry = entry.unwrap();
            prop_assert_eq!(entry.category(), spec.category);
            prop_assert_eq!(entry.node_kind(), spec.node_kind);
            let effective: MessageTypes = spec.effective_types().iter().copied().collect();
            prop_assert_eq!(entry.message_types(), &effective);
        }

        let registered: HashSet<_> = registry.handler_ids().unwrap().into_iter().collect();
        let expected: HashSet<_> = model.iter().map(|spec| spec.id.as_str()).collect();
        prop_assert_eq!(registered, expected);
    }
}
