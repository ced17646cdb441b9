use log::{debug, warn};
use std::sync::Arc;

use crate::logic::bindings::{Binding, BindingBuilder, DefaultBindingBuilder, CONTENT};
use crate::logic::script::ScriptEvaluator;
use crate::logic::walker::{resolve_firings, targets_for, Firing, Target};
use crate::model::{
    parse_transformers, ContentSide, EmbedKind, Exchange, Method, NodeRef, OwnerLevel, Phase,
    RepresentationTransformer, RequestContext, ResourceType, Scope, TransformError,
};

/// Verb/resource-type gate deciding whether one owner level's transformers are considered at all
pub type Gate = fn(Method, ResourceType) -> bool;

/// Maps a transformer's owner and scope onto the part of the payload it rewrites
pub type TargetRule = fn(OwnerLevel, Scope, ResourceType, Method) -> Target;

/// Everything that differs between the request-time and response-time dispatch
#[derive(Debug, Clone, Copy)]
pub struct DispatchStrategy {
    pub phase: Phase,
    pub db_gate: Gate,
    pub coll_gate: Gate,
    pub targets: TargetRule,
    /// Log target handed to scripts as `$logger`
    pub logger: &'static str,
}

impl DispatchStrategy {
    /// Runs before the store operation of a write, rewriting `$requestContent`
    pub fn request() -> Self {
        Self {
            phase: Phase::Request,
            db_gate: request_db_gate,
            coll_gate: request_coll_gate,
            targets: request_targets,
            logger: "docstore::transformers::request",
        }
    }

    /// Runs after a GET representation is built, rewriting `$responseContent`
    pub fn response() -> Self {
        Self {
            phase: Phase::Response,
            db_gate: response_db_gate,
            coll_gate: response_coll_gate,
            targets: response_targets,
            logger: "docstore::transformers::response",
        }
    }

    fn gate(&self, owner: OwnerLevel) -> Gate {
        match owner {
            OwnerLevel::Database => self.db_gate,
            OwnerLevel::Collection => self.coll_gate,
        }
    }

    /// A transformer without a phase only counts as a request transformer
    fn request_phase_default_allowed(&self) -> bool {
        self.phase == Phase::Request
    }
}

fn response_db_gate(method: Method, resource: ResourceType) -> bool {
    method == Method::Get && matches!(resource, ResourceType::Database | ResourceType::Collection)
}

fn response_coll_gate(method: Method, resource: ResourceType) -> bool {
    method == Method::Get && (resource == ResourceType::Collection || resource.is_document_like())
}

fn request_db_gate(method: Method, resource: ResourceType) -> bool {
    method.is_write() && matches!(resource, ResourceType::Database | ResourceType::Collection)
}

fn request_coll_gate(method: Method, resource: ResourceType) -> bool {
    method.is_write() && (resource == ResourceType::Collection || resource.is_document_like())
}

fn response_targets(owner: OwnerLevel, scope: Scope, resource: ResourceType, _: Method) -> Target {
    targets_for(owner, scope, resource)
}

const POSTED_DOCUMENTS: &[EmbedKind] = &[EmbedKind::Document];

/// Request bodies only persist what is being written, so two table entries are moved onto it.
///
/// A collection PUT/PATCH body is the collection itself, never a sub-collection listing, so
/// database-level CHILDREN rewrites that body. A POST to a collection persists only the
/// embedded `rh:doc` entries, so anything aimed at the wrapper root rewrites each new
/// document instead.
fn request_targets(owner: OwnerLevel, scope: Scope, resource: ResourceType, method: Method) -> Target {
    let target = match (owner, scope, resource) {
        (OwnerLevel::Database, Scope::Children, ResourceType::Collection) => Target::Root,
        _ => targets_for(owner, scope, resource),
    };
    match (target, resource, method) {
        (Target::Root, ResourceType::Collection, Method::Post) => Target::Embedded(POSTED_DOCUMENTS),
        _ => target,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    NotStarted,
    DbMetadataEvaluated,
    CollectionMetadataEvaluated,
    Done,
}

impl DispatchState {
    fn next(self) -> Self {
        match self {
            DispatchState::NotStarted => DispatchState::DbMetadataEvaluated,
            DispatchState::DbMetadataEvaluated => DispatchState::CollectionMetadataEvaluated,
            DispatchState::CollectionMetadataEvaluated | DispatchState::Done => DispatchState::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub state: DispatchState,
    /// Number of script invocations performed
    pub fired: usize,
}

pub struct TransformerDispatcher {
    evaluator: Arc<dyn ScriptEvaluator>,
    binding_builder: Arc<dyn BindingBuilder>,
}

impl TransformerDispatcher {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self {
            evaluator,
            binding_builder: Arc::new(DefaultBindingBuilder),
        }
    }

    pub fn with_binding_builder(mut self, builder: Arc<dyn BindingBuilder>) -> Self {
        self.binding_builder = builder;
        self
    }

    /// Apply the database-level and then the collection-level transformers of one phase.
    ///
    /// Both transformer lists are parsed before any script runs, so malformed metadata at
    /// either level aborts the request untouched. A script error stops the current pass
    /// and skips the remaining one; mutations already made stay in place.
    pub fn apply(
        &self,
        strategy: &DispatchStrategy,
        exchange: &Exchange,
        ctx: &mut RequestContext,
    ) -> Result<DispatchOutcome, TransformError> {
        let allow_default = strategy.request_phase_default_allowed();
        let db_rts = parse_transformers(ctx.db_props(), allow_default)?;
        let coll_rts = parse_transformers(ctx.coll_props(), allow_default)?;

        let method = ctx.method();
        let resource = ctx.resource_type();
        let mut outcome = DispatchOutcome {
            state: DispatchState::NotStarted,
            fired: 0,
        };

        for (owner, rts) in [
            (OwnerLevel::Database, &db_rts),
            (OwnerLevel::Collection, &coll_rts),
        ] {
            if !rts.is_empty() && (strategy.gate(owner))(method, resource) {
                outcome.fired += self.run_pass(strategy, owner, rts, exchange, ctx)?;
            }
            outcome.state = outcome.state.next();
            debug!(
                target: strategy.logger,
                "{} {} {}: {:?} after {} invocation(s)",
                method,
                resource,
                strategy.phase,
                outcome.state,
                outcome.fired
            );
        }

        outcome.state = outcome.state.next();
        Ok(outcome)
    }

    fn run_pass(
        &self,
        strategy: &DispatchStrategy,
        owner: OwnerLevel,
        rts: &[RepresentationTransformer],
        exchange: &Exchange,
        ctx: &mut RequestContext,
    ) -> Result<usize, TransformError> {
        let side = ContentSide::from(strategy.phase);
        let mut fired = 0;

        for rt in rts.iter().filter(|rt| rt.phase == strategy.phase) {
            let target = (strategy.targets)(owner, rt.scope, ctx.resource_type(), ctx.method());
            for firing in resolve_firings(ctx.content(side), target) {
                let mut bindings = self.binding_builder.build(exchange, ctx, strategy.logger);
                let current = match firing {
                    Firing::Root => NodeRef::root(side),
                    Firing::Child(node) => {
                        let child = NodeRef::new(side, node);
                        bindings.put(strategy.phase.content_var(), Binding::Node(child));
                        child
                    }
                };
                bindings.put(CONTENT, Binding::Node(current));

                debug!(
                    target: strategy.logger,
                    "Applying {} {}-scoped {} of {} '{}' to {:?}",
                    rt.phase,
                    rt.scope,
                    rt.script,
                    owner,
                    owner_name(owner, ctx),
                    firing
                );

                if let Err(e) = self.evaluator.evaluate(&rt.script, &bindings, ctx) {
                    warn!(
                        target: strategy.logger,
                        "{} of {} '{}' failed: {}",
                        rt.script,
                        owner,
                        owner_name(owner, ctx),
                        e
                    );
                    return Err(e.into());
                }
                fired += 1;
            }
        }

        Ok(fired)
    }
}

fn owner_name(owner: OwnerLevel, ctx: &RequestContext) -> &str {
    match owner {
        OwnerLevel::Database => ctx.db_name(),
        OwnerLevel::Collection => ctx.coll_name().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::bindings::{Bindings, REQUEST_CONTENT, RESPONSE_CONTENT};
    use crate::logic::script::OpsEvaluator;
    use crate::model::{ContentTree, EmbedKind, ScriptError, ScriptRef};
    use parking_lot::Mutex;
    use serde_json::{json, Map, Value};

    #[derive(Debug, Clone)]
    struct Call {
        script: String,
        response_target: Option<NodeRef>,
        request_target: Option<NodeRef>,
        response_snapshot: Value,
    }

    /// Records every invocation and marks the bound nodes with the script name.
    /// Scripts named `fail*` raise an error.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn scripts(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.script).collect()
        }
    }

    impl ScriptEvaluator for Recorder {
        fn evaluate(
            &self,
            script: &ScriptRef,
            bindings: &Bindings,
            ctx: &mut RequestContext,
        ) -> Result<(), ScriptError> {
            let name = match script {
                ScriptRef::Named(name) => name.clone(),
                ScriptRef::Inline(source) => source.to_string(),
            };
            self.calls.lock().push(Call {
                script: name.clone(),
                response_target: bindings.node(RESPONSE_CONTENT),
                request_target: bindings.node(REQUEST_CONTENT),
                response_snapshot: ctx.response_content().to_value(),
            });

            if name.starts_with("fail") {
                return Err(ScriptError::Raised(name));
            }
            for var in [REQUEST_CONTENT, RESPONSE_CONTENT] {
                if let Some(node) = bindings.node(var) {
                    if let Some(fields) = ctx.content_mut(node.side).fields_mut(node.node) {
                        fields.insert(name.clone(), json!(true));
                    }
                }
            }
            Ok(())
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn rts(list: Value) -> Map<String, Value> {
        object(json!({ "rts": list }))
    }

    fn recording() -> (Arc<Recorder>, TransformerDispatcher) {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = TransformerDispatcher::new(recorder.clone());
        (recorder, dispatcher)
    }

    /// Collection listing embedding three documents and two files
    fn listing() -> ContentTree {
        ContentTree::from_json(object(json!({
            "_id": "orders",
            "_embedded": {
                "rh:doc": [{"_id": "d1"}, {"_id": "d2"}, {"_id": "d3"}],
                "rh:file": [{"_id": "f1"}, {"_id": "f2"}]
            }
        })))
    }

    fn get(resource: ResourceType) -> RequestContext {
        RequestContext::new(resource, Method::Get, "shop").with_collection("orders")
    }

    fn target_id(ctx: &RequestContext, node: NodeRef) -> Value {
        ctx.content(node.side)
            .fields(node.node)
            .and_then(|f| f.get("_id").cloned())
            .unwrap_or(Value::Null)
    }

    #[test]
    fn test_absent_metadata_is_a_no_op() {
        let (recorder, dispatcher) = recording();

        for resource in [
            ResourceType::Database,
            ResourceType::Collection,
            ResourceType::Document,
            ResourceType::File,
        ] {
            for strategy in [DispatchStrategy::request(), DispatchStrategy::response()] {
                let mut ctx = get(resource)
                    .with_db_props(object(json!({"desc": "plain"})))
                    .with_response_content(listing());
                let outcome = dispatcher
                    .apply(&strategy, &Exchange::default(), &mut ctx)
                    .unwrap();

                assert_eq!(outcome.state, DispatchState::Done);
                assert_eq!(outcome.fired, 0);
                assert_eq!(ctx.response_content(), &listing());
            }
        }
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_phases_are_isolated() {
        let (recorder, dispatcher) = recording();
        let request_only = rts(json!([
            {"phase": "REQUEST", "scope": "THIS", "name": "req-this"},
            {"phase": "REQUEST", "scope": "CHILDREN", "name": "req-children"}
        ]));

        for resource in [ResourceType::Collection, ResourceType::Document] {
            let mut ctx = get(resource)
                .with_db_props(request_only.clone())
                .with_coll_props(request_only.clone())
                .with_response_content(listing());
            dispatcher
                .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
                .unwrap();
        }
        assert!(recorder.calls().is_empty());

        let response_only = rts(json!([
            {"phase": "RESPONSE", "scope": "THIS", "name": "resp-this"},
            {"phase": "RESPONSE", "scope": "CHILDREN", "name": "resp-children"}
        ]));
        for resource in [ResourceType::Collection, ResourceType::Document] {
            let mut ctx = RequestContext::new(resource, Method::Post, "shop")
                .with_collection("orders")
                .with_db_props(response_only.clone())
                .with_coll_props(response_only.clone())
                .with_request_content(listing());
            dispatcher
                .apply(&DispatchStrategy::request(), &Exchange::default(), &mut ctx)
                .unwrap();
        }
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_this_scope_fires_only_on_the_owner() {
        let (recorder, dispatcher) = recording();
        let props = rts(json!([{"phase": "RESPONSE", "scope": "THIS", "name": "coll-this"}]));

        let mut ctx = get(ResourceType::Collection)
            .with_coll_props(props.clone())
            .with_response_content(listing());
        let outcome = dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 1);
        assert_eq!(
            recorder.calls()[0].response_target,
            Some(NodeRef::root(ContentSide::Response))
        );
        assert_eq!(ctx.response_content().root_fields()["coll-this"], json!(true));

        for resource in [ResourceType::Document, ResourceType::Database] {
            let mut ctx = get(resource)
                .with_coll_props(props.clone())
                .with_response_content(listing());
            let outcome = dispatcher
                .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
                .unwrap();
            assert_eq!(outcome.fired, 0);
        }
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn test_children_scope_visits_every_embedded_node_in_order() {
        let (recorder, dispatcher) = recording();
        let mut ctx = get(ResourceType::Collection)
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "tag"}
            ])))
            .with_response_content(listing());

        let outcome = dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 5);

        let visited: Vec<Value> = recorder
            .calls()
            .iter()
            .map(|call| target_id(&ctx, call.response_target.unwrap()))
            .collect();
        assert_eq!(
            visited,
            vec![json!("d1"), json!("d2"), json!("d3"), json!("f1"), json!("f2")]
        );

        // every child carries the mark, the listing root does not
        let rendered = ctx.response_content().to_value();
        assert!(rendered.get("tag").is_none());
        for kind in ["rh:doc", "rh:file"] {
            for child in rendered["_embedded"][kind].as_array().unwrap() {
                assert_eq!(child["tag"], json!(true));
            }
        }
    }

    #[test]
    fn test_database_pass_completes_before_collection_pass() {
        let (recorder, dispatcher) = recording();
        let response = ContentTree::from_json(object(json!({
            "_id": "orders",
            "_embedded": {
                "rh:coll": [{"_id": "sub1"}, {"_id": "sub2"}],
                "rh:doc": [{"_id": "d1"}, {"_id": "d2"}]
            }
        })));
        let mut ctx = get(ResourceType::Collection)
            .with_db_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "db-mark"}
            ])))
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "coll-mark"}
            ])))
            .with_response_content(response);

        dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();

        assert_eq!(
            recorder.scripts(),
            vec!["db-mark", "db-mark", "coll-mark", "coll-mark"]
        );
        for call in recorder.calls().iter().filter(|c| c.script == "coll-mark") {
            for sub in call.response_snapshot["_embedded"]["rh:coll"].as_array().unwrap() {
                assert_eq!(sub["db-mark"], json!(true));
            }
        }
    }

    #[test]
    fn test_malformed_metadata_fails_before_any_script() {
        let (recorder, dispatcher) = recording();
        let valid = rts(json!([{"phase": "RESPONSE", "scope": "THIS", "name": "ok"}]));
        let broken = rts(json!([{"phase": "RESPONSE", "scope": "SIBLINGS", "name": "bad"}]));

        for strategy in [DispatchStrategy::request(), DispatchStrategy::response()] {
            for resource in [
                ResourceType::Database,
                ResourceType::Collection,
                ResourceType::Document,
                ResourceType::File,
            ] {
                let mut ctx = get(resource)
                    .with_db_props(valid.clone())
                    .with_coll_props(broken.clone())
                    .with_response_content(listing());
                let err = dispatcher
                    .apply(&strategy, &Exchange::default(), &mut ctx)
                    .unwrap_err();
                assert!(matches!(err, TransformError::InvalidMetadata(_)));
            }
        }
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_mutations_are_visible_in_the_rendered_response() {
        let dispatcher = TransformerDispatcher::new(Arc::new(OpsEvaluator::new()));
        let mut ctx = get(ResourceType::Collection)
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "THIS", "script": [{"op": "set", "path": "listed", "value": true}]},
                {"phase": "RESPONSE", "scope": "CHILDREN", "script": [{"op": "set", "path": "seen", "value": true}]}
            ])))
            .with_response_content(listing());

        dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();

        let rendered = ctx.response_content().to_value();
        assert_eq!(rendered["listed"], json!(true));
        assert_eq!(rendered["_embedded"]["rh:doc"][2]["seen"], json!(true));
        assert_eq!(rendered["_embedded"]["rh:file"][1]["seen"], json!(true));
    }

    #[test]
    fn test_missing_child_lists_fire_nothing() {
        let (recorder, dispatcher) = recording();
        let props = rts(json!([{"phase": "RESPONSE", "scope": "CHILDREN", "name": "tag"}]));

        let docs_only = ContentTree::from_json(object(json!({
            "_embedded": {"rh:doc": [{"_id": "d1"}]}
        })));
        let mut ctx = get(ResourceType::Collection)
            .with_coll_props(props.clone())
            .with_response_content(docs_only);
        let outcome = dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 1);

        let mut bare = get(ResourceType::Collection)
            .with_coll_props(props)
            .with_db_props(rts(json!([{"phase": "RESPONSE", "scope": "CHILDREN", "name": "db"}])))
            .with_response_content(ContentTree::from_fields(object(json!({"_id": "orders"}))));
        let outcome = dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut bare)
            .unwrap();
        assert_eq!(outcome.fired, 0);
        assert_eq!(outcome.state, DispatchState::Done);
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn test_document_children_scope_targets_the_document() {
        let (recorder, dispatcher) = recording();
        let mut ctx = get(ResourceType::Document)
            .with_resource_id("d1")
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "doc-mark"}
            ])))
            .with_response_content(ContentTree::from_fields(object(json!({"_id": "d1"}))));

        let outcome = dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 1);
        assert_eq!(
            recorder.calls()[0].response_target,
            Some(NodeRef::root(ContentSide::Response))
        );
        assert_eq!(ctx.response_content().root_fields()["doc-mark"], json!(true));
    }

    #[test]
    fn test_script_error_stops_the_pass_and_skips_the_collection_level() {
        let (recorder, dispatcher) = recording();
        let mut ctx = get(ResourceType::Collection)
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "first"},
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "fail-here"},
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "never"}
            ])))
            .with_response_content(listing());

        let err = dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::Script(ScriptError::Raised("fail-here".to_string()))
        );
        // five "first" invocations, then the failing one on the first child
        assert_eq!(recorder.calls().len(), 6);
        assert!(!recorder.scripts().contains(&"never".to_string()));
        // no rollback
        assert_eq!(
            ctx.response_content().to_value()["_embedded"]["rh:doc"][0]["first"],
            json!(true)
        );

        let (recorder, dispatcher) = recording();
        let mut ctx = get(ResourceType::Collection)
            .with_db_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "fail-db"}
            ])))
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "THIS", "name": "coll"}
            ])))
            .with_response_content(ContentTree::from_json(object(json!({
                "_embedded": {"rh:coll": [{"_id": "sub"}]}
            }))));
        assert!(dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .is_err());
        assert_eq!(recorder.scripts(), vec!["fail-db"]);
    }

    #[test]
    fn test_request_phase_binds_request_children() {
        let (recorder, dispatcher) = recording();
        let mut request = ContentTree::new();
        for id in ["n1", "n2"] {
            request.embed(request.root(), EmbedKind::Document, object(json!({"_id": id})));
        }
        let mut ctx = RequestContext::new(ResourceType::Collection, Method::Post, "shop")
            .with_collection("orders")
            .with_coll_props(rts(json!([
                {"scope": "CHILDREN", "name": "stamp"}
            ])))
            .with_request_content(request);

        let outcome = dispatcher
            .apply(&DispatchStrategy::request(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 2);

        let targets: Vec<Value> = recorder
            .calls()
            .iter()
            .map(|call| target_id(&ctx, call.request_target.unwrap()))
            .collect();
        assert_eq!(targets, vec![json!("n1"), json!("n2")]);
        assert_eq!(
            ctx.request_content().to_value()["_embedded"]["rh:doc"][1]["stamp"],
            json!(true)
        );
    }

    #[test]
    fn test_request_gates_ignore_reads_and_deletes() {
        let (recorder, dispatcher) = recording();
        for method in [Method::Get, Method::Delete] {
            let mut ctx = RequestContext::new(ResourceType::Document, method, "shop")
                .with_collection("orders")
                .with_coll_props(rts(json!([
                    {"phase": "REQUEST", "scope": "CHILDREN", "name": "stamp"}
                ])));
            dispatcher
                .apply(&DispatchStrategy::request(), &Exchange::default(), &mut ctx)
                .unwrap();
        }
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_children_get_fresh_bindings() {
        let (recorder, dispatcher) = recording();
        let mut ctx = get(ResourceType::Collection)
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "name": "tag"}
            ])))
            .with_response_content(listing());
        dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();

        let calls = recorder.calls();
        let mut targets: Vec<NodeRef> = calls.iter().filter_map(|c| c.response_target).collect();
        targets.dedup();
        assert_eq!(targets.len(), 5);
        // the request root stays bound for every child
        assert!(calls
            .iter()
            .all(|c| c.request_target == Some(NodeRef::root(ContentSide::Request))));
    }

    #[test]
    fn test_untargeted_ops_follow_the_current_node() {
        let dispatcher = TransformerDispatcher::new(Arc::new(OpsEvaluator::new()));
        let stamp = json!([{"op": "set", "path": "stamped", "value": true}]);

        let mut ctx = RequestContext::new(ResourceType::Document, Method::Put, "shop")
            .with_collection("orders")
            .with_coll_props(rts(json!([{"scope": "CHILDREN", "script": stamp.clone()}])))
            .with_request_content(ContentTree::from_json(object(json!({"total": 3}))));
        dispatcher
            .apply(&DispatchStrategy::request(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(ctx.request_content().to_value()["stamped"], json!(true));
        assert!(ctx.response_content().to_value().get("stamped").is_none());

        let mut ctx = get(ResourceType::Collection)
            .with_coll_props(rts(json!([
                {"phase": "RESPONSE", "scope": "CHILDREN", "script": stamp}
            ])))
            .with_response_content(listing());
        dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();
        let rendered = ctx.response_content().to_value();
        assert_eq!(rendered["_embedded"]["rh:file"][1]["stamped"], json!(true));
        assert!(rendered.get("stamped").is_none());
    }

    #[test]
    fn test_phaseless_entries_are_skipped_by_the_response_phase() {
        let (recorder, dispatcher) = recording();
        let stored = rts(json!([
            {"scope": "THIS", "name": "req-default"},
            {"phase": "RESPONSE", "scope": "THIS", "name": "resp"}
        ]));
        let mut ctx = RequestContext::new(ResourceType::Database, Method::Get, "shop")
            .with_db_props(stored.clone())
            .with_response_content(ContentTree::from_json(object(json!({"_id": "shop"}))));

        let outcome = dispatcher
            .apply(&DispatchStrategy::response(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 1);
        assert_eq!(recorder.scripts(), vec!["resp"]);

        let mut ctx = RequestContext::new(ResourceType::Database, Method::Put, "shop")
            .with_db_props(stored)
            .with_request_content(ContentTree::from_json(object(json!({"desc": "d"}))));
        dispatcher
            .apply(&DispatchStrategy::request(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(recorder.scripts(), vec!["resp", "req-default"]);
    }

    #[test]
    fn test_database_children_rewrite_a_written_collection() {
        let (recorder, dispatcher) = recording();
        let mut ctx = RequestContext::new(ResourceType::Collection, Method::Put, "shop")
            .with_collection("orders")
            .with_db_props(rts(json!([
                {"phase": "REQUEST", "scope": "CHILDREN", "name": "coll-stamp"}
            ])))
            .with_request_content(ContentTree::from_json(object(json!({"desc": "d"}))));

        let outcome = dispatcher
            .apply(&DispatchStrategy::request(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 1);
        assert_eq!(ctx.request_content().to_value()["coll-stamp"], json!(true));
        assert_eq!(
            recorder.calls()[0].request_target,
            Some(NodeRef::root(ContentSide::Request))
        );
    }

    #[test]
    fn test_root_targets_on_post_move_to_each_posted_document() {
        let (recorder, dispatcher) = recording();
        let mut request = ContentTree::new();
        for id in ["n1", "n2"] {
            request.embed(request.root(), EmbedKind::Document, object(json!({"_id": id})));
        }
        let mut ctx = RequestContext::new(ResourceType::Collection, Method::Post, "shop")
            .with_collection("orders")
            .with_coll_props(rts(json!([
                {"phase": "REQUEST", "scope": "THIS", "name": "this-stamp"}
            ])))
            .with_request_content(request);

        let outcome = dispatcher
            .apply(&DispatchStrategy::request(), &Exchange::default(), &mut ctx)
            .unwrap();
        assert_eq!(outcome.fired, 2);
        assert_eq!(recorder.calls().len(), 2);

        let rendered = ctx.request_content().to_value();
        assert!(rendered.get("this-stamp").is_none());
        assert_eq!(rendered["_embedded"]["rh:doc"][0]["this-stamp"], json!(true));
        assert_eq!(rendered["_embedded"]["rh:doc"][1]["this-stamp"], json!(true));
    }
}
