use crate::model::{ContentTree, EmbedKind, NodeId, OwnerLevel, ResourceType, Scope};

/// What a transformer is applied to for a given request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Nothing,
    /// The payload root, with the default binding set
    Root,
    /// Every child embedded under the root for these kinds, in this order
    Embedded(&'static [EmbedKind]),
}

/// One script invocation the dispatcher has to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    Root,
    Child(NodeId),
}

const SUB_COLLECTIONS: &[EmbedKind] = &[EmbedKind::SubCollection];
const DOCUMENTS_AND_FILES: &[EmbedKind] = &[EmbedKind::Document, EmbedKind::File];

/// Decide the target of a transformer from where it was declared and what was requested.
///
/// Every combination is spelled out so a new resource type or scope fails to compile
/// until it is placed here.
pub fn targets_for(owner: OwnerLevel, scope: Scope, resource: ResourceType) -> Target {
    use OwnerLevel as O;
    use ResourceType as R;
    use Scope as S;

    match (owner, scope, resource) {
        (O::Database, S::This, R::Database) => Target::Root,
        (O::Database, S::This, R::Collection) => Target::Nothing,
        (O::Database, S::This, R::Document) => Target::Nothing,
        (O::Database, S::This, R::File) => Target::Nothing,
        (O::Database, S::Children, R::Database) => Target::Nothing,
        (O::Database, S::Children, R::Collection) => Target::Embedded(SUB_COLLECTIONS),
        (O::Database, S::Children, R::Document) => Target::Nothing,
        (O::Database, S::Children, R::File) => Target::Nothing,

        (O::Collection, S::This, R::Database) => Target::Nothing,
        (O::Collection, S::This, R::Collection) => Target::Root,
        (O::Collection, S::This, R::Document) => Target::Nothing,
        (O::Collection, S::This, R::File) => Target::Nothing,
        (O::Collection, S::Children, R::Database) => Target::Nothing,
        (O::Collection, S::Children, R::Collection) => Target::Embedded(DOCUMENTS_AND_FILES),
        // a document has nothing below it, so its children scope is the document itself
        (O::Collection, S::Children, R::Document) => Target::Root,
        (O::Collection, S::Children, R::File) => Target::Root,
    }
}

/// Children embedded under `parent` for `kind`; absent lists yield nothing
pub fn children_of(tree: &ContentTree, parent: NodeId, kind: EmbedKind) -> Vec<NodeId> {
    tree.embedded(parent, kind.key())
        .map(<[NodeId]>::to_vec)
        .unwrap_or_default()
}

/// Expand a target into the concrete invocations against `tree`
pub fn resolve_firings(tree: &ContentTree, target: Target) -> Vec<Firing> {
    match target {
        Target::Nothing => Vec::new(),
        Target::Root => vec![Firing::Root],
        Target::Embedded(kinds) => kinds
            .iter()
            .flat_map(|kind| children_of(tree, tree.root(), *kind))
            .map(Firing::Child)
            .collect(),
    }
}
