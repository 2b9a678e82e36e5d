//! Eager-load planning.
//!
//! A [`Preloader`] collects dot-separated relation paths (`"posts.comments"`)
//! with optional constraint closures into a tree. A closure attaches to the
//! last segment of its path; re-declaring a path merges closures into the
//! existing node instead of duplicating it.
//!
//! [`QueryPlan::build`] validates every segment against the registry and
//! applies the closures, before any query is issued. Closures receive the
//! node's [`ModelQuery`], so they can constrain it and declare nested
//! preloads of their own.

use crate::executor::LifeError;
use crate::relation::keys::ResolvedRelation;
use crate::relation::query::{Constraint, ModelQuery};
use crate::schema::{EntitySchema, SchemaRegistry};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// One path segment of the preload tree
#[derive(Clone)]
pub struct PreloadNode {
    pub name: String,
    pub constraints: Vec<Constraint>,
    pub children: Preloader,
}

impl fmt::Debug for PreloadNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreloadNode")
            .field("name", &self.name)
            .field("constraints", &self.constraints.len())
            .field("children", &self.children)
            .finish()
    }
}

/// Tree of requested eager loads
///
/// # Example
///
/// ```
/// use lifeguard_relations::relation::preload::Preloader;
///
/// let mut preloader = Preloader::default();
/// preloader.add("posts.comments", None).unwrap();
/// preloader.add("posts", None).unwrap();
/// preloader.add("profile", None).unwrap();
///
/// assert_eq!(preloader.paths(), vec!["posts", "posts.comments", "profile"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Preloader {
    nodes: Vec<PreloadNode>,
}

impl Preloader {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[PreloadNode] {
        &self.nodes
    }

    /// Add `path`, attaching `constraint` to its last segment
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for an empty path or segment.
    pub fn add(&mut self, path: &str, constraint: Option<Constraint>) -> Result<(), LifeError> {
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(LifeError::config(format!("invalid preload path `{path}`")));
        }

        let last = segments.len() - 1;
        let mut level = self;
        for (depth, segment) in segments.into_iter().enumerate() {
            let index = match level.nodes.iter().position(|node| node.name == segment) {
                Some(index) => index,
                None => {
                    level.nodes.push(PreloadNode {
                        name: segment.to_string(),
                        constraints: Vec::new(),
                        children: Preloader::default(),
                    });
                    level.nodes.len() - 1
                }
            };
            let node = &mut level.nodes[index];
            if depth == last {
                if let Some(constraint) = constraint.clone() {
                    node.constraints.push(constraint);
                }
            }
            level = &mut node.children;
        }
        Ok(())
    }

    /// Merge another tree into this one
    pub fn merge(&mut self, other: Preloader) {
        for incoming in other.nodes {
            match self.nodes.iter_mut().find(|node| node.name == incoming.name) {
                Some(node) => {
                    node.constraints.extend(incoming.constraints);
                    node.children.merge(incoming.children);
                }
                None => self.nodes.push(incoming),
            }
        }
    }

    /// Every declared path, depth first
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for node in &self.nodes {
            let path = join_path(prefix, &node.name);
            out.push(path.clone());
            node.children.collect_paths(&path, out);
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Validated eager-load node, ready to execute
#[derive(Debug, Clone)]
pub struct PlanNode {
    /// Full dot path from the root
    pub path: String,
    /// 1 for relations of the root entities
    pub depth: usize,
    pub relation: Arc<ResolvedRelation>,
    /// Constrained query applied to this node's batch
    pub query: ModelQuery,
    pub children: Vec<PlanNode>,
}

/// Ordered eager-load plan for one fetch
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub nodes: Vec<PlanNode>,
}

impl QueryPlan {
    /// Validate `preloader` against `schema` and apply every constraint
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` when a segment names no relation
    /// on the schema one level up, or an error recorded by a constraint.
    pub fn build(registry: &SchemaRegistry, schema: &EntitySchema, preloader: &Preloader) -> Result<Self, LifeError> {
        Ok(Self {
            nodes: build_level(registry, schema, preloader, "", 1)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `(depth, path)` of every node, breadth first
    pub fn entries(&self) -> Vec<(usize, &str)> {
        let mut entries = Vec::new();
        let mut queue: VecDeque<&PlanNode> = self.nodes.iter().collect();
        while let Some(node) = queue.pop_front() {
            entries.push((node.depth, node.path.as_str()));
            queue.extend(node.children.iter());
        }
        entries
    }
}

fn build_level(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    preloader: &Preloader,
    prefix: &str,
    depth: usize,
) -> Result<Vec<PlanNode>, LifeError> {
    let mut nodes = Vec::with_capacity(preloader.nodes.len());
    for node in &preloader.nodes {
        let path = join_path(prefix, &node.name);
        let relation = registry.relation(&schema.name, &node.name).map_err(|_| {
            LifeError::config(format!(
                "unknown relation `{}` in preload path `{path}` on schema `{}`",
                node.name, schema.name
            ))
        })?;

        let mut query = ModelQuery::for_preload(registry.clone(), relation.clone());
        for constraint in &node.constraints {
            query = constraint(query);
        }
        if let Some(err) = query.take_error() {
            return Err(err);
        }

        let mut children = node.children.clone();
        children.merge(query.take_preloads());
        let children = build_level(registry, relation.target(), &children, &path, depth + 1)?;

        nodes.push(PlanNode {
            path,
            depth,
            relation,
            query,
            children,
        });
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Predicate;
    use crate::relation::def::RelationDef;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .schema(
                EntitySchema::new("User", "users")
                    .relation("posts", RelationDef::one_to_many("Post"))
                    .relation("profile", RelationDef::one_to_one("Profile")),
            )
            .schema(EntitySchema::new("Post", "posts").relation("comments", RelationDef::one_to_many("Comment")))
            .schema(EntitySchema::new("Comment", "comments"))
            .schema(EntitySchema::new("Profile", "profiles"))
            .build()
            .unwrap()
    }

    fn approved() -> Constraint {
        Arc::new(|query: ModelQuery| query.filter(Predicate::eq("approved", true)))
    }

    #[test]
    fn test_redeclared_path_merges() {
        let mut preloader = Preloader::default();
        preloader.add("posts", Some(approved())).unwrap();
        preloader.add("posts", Some(approved())).unwrap();
        assert_eq!(preloader.nodes().len(), 1);
        assert_eq!(preloader.nodes()[0].constraints.len(), 2);
    }

    #[test]
    fn test_constraint_attaches_to_last_segment() {
        let mut preloader = Preloader::default();
        preloader.add("posts.comments", Some(approved())).unwrap();
        let posts = &preloader.nodes()[0];
        assert!(posts.constraints.is_empty());
        assert_eq!(posts.children.nodes()[0].constraints.len(), 1);
    }

    #[test]
    fn test_empty_segment_is_rejected() {
        let mut preloader = Preloader::default();
        assert!(preloader.add("posts..comments", None).unwrap_err().is_configuration());
    }

    #[test]
    fn test_plan_is_breadth_first() {
        let registry = registry();
        let mut preloader = Preloader::default();
        preloader.add("posts.comments", None).unwrap();
        preloader.add("profile", None).unwrap();
        let plan = QueryPlan::build(&registry, &registry.get("User").unwrap(), &preloader).unwrap();
        assert_eq!(
            plan.entries(),
            vec![(1, "posts"), (1, "profile"), (2, "posts.comments")]
        );
    }

    #[test]
    fn test_unknown_segment_is_configuration_error() {
        let registry = registry();
        let mut preloader = Preloader::default();
        preloader.add("posts.likes", None).unwrap();
        let err = QueryPlan::build(&registry, &registry.get("User").unwrap(), &preloader).unwrap_err();
        assert!(err.to_string().contains("posts.likes"));
    }

    #[test]
    fn test_nested_preload_inside_closure() {
        let registry = registry();
        let mut preloader = Preloader::default();
        preloader
            .add("posts", Some(Arc::new(|query: ModelQuery| query.preload("comments"))))
            .unwrap();
        let plan = QueryPlan::build(&registry, &registry.get("User").unwrap(), &preloader).unwrap();
        assert_eq!(plan.entries(), vec![(1, "posts"), (2, "posts.comments")]);
    }
}
