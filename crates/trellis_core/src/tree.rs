//! Output tree and construct scopes.
//!
//! An [`OutputTree`] owns every declaration produced for one stack. Builders
//! never touch it directly: they receive a [`Scope`], a handle that carries the
//! current construct path and the owning assembly, and register declarations
//! through it.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::environment::{Environment, StackConfig};
use crate::error::{ConstructError, ConstructResult};
use crate::naming;
use crate::resource::{ResourceDeclaration, ResourceFamily, ResourceHandle};
use crate::suppression::Suppression;
use crate::validate::validate_declaration;

/// The root aggregate of all declarations for one stack.
#[derive(Debug)]
pub struct OutputTree {
    config: StackConfig,
    declarations: Vec<ResourceDeclaration>,
    index: HashMap<String, usize>,
    paths: BTreeSet<String>,
    aborted: Option<String>,
}

impl OutputTree {
    pub fn new(config: StackConfig) -> Self {
        Self {
            config,
            declarations: Vec::new(),
            index: HashMap::new(),
            paths: BTreeSet::new(),
            aborted: None,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.config.environment
    }

    /// The top-level scope of this tree.
    pub fn root(&mut self) -> Scope<'_> {
        Scope {
            tree: self,
            path: Vec::new(),
            owner: None,
        }
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.index.contains_key(logical_id)
    }

    pub fn get(&self, logical_id: &str) -> Option<&ResourceDeclaration> {
        self.index.get(logical_id).map(|&i| &self.declarations[i])
    }

    /// Look up the declaration behind a handle.
    pub fn resolve(&self, handle: &ResourceHandle) -> ConstructResult<&ResourceDeclaration> {
        self.get(&handle.logical_id)
            .filter(|decl| decl.path() == handle.path)
            .ok_or_else(|| ConstructError::BindingNotFound {
                resource: self.config.name.clone(),
                target: handle.path.clone(),
            })
    }

    pub fn find_by_path(&self, path: &str) -> Option<&ResourceDeclaration> {
        self.declarations.iter().find(|d| d.path() == path)
    }

    /// Declarations in registration order.
    pub fn declarations(&self) -> &[ResourceDeclaration] {
        &self.declarations
    }

    pub fn declarations_of(&self, family: ResourceFamily) -> impl Iterator<Item = &ResourceDeclaration> {
        self.declarations.iter().filter(move |d| d.family() == family)
    }

    /// Attach documented suppressions to a declaration.
    ///
    /// Never fails: an unknown handle is logged and ignored.
    pub fn suppress(&mut self, handle: &ResourceHandle, entries: impl IntoIterator<Item = Suppression>) {
        match self.index.get(&handle.logical_id) {
            Some(&i) => self.declarations[i].add_suppressions(entries),
            None => warn!("Ignoring suppressions for unknown resource '{}'", handle.path),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub(crate) fn ensure_usable(&self) -> ConstructResult<()> {
        match &self.aborted {
            Some(assembly) => Err(ConstructError::AssemblyAborted {
                assembly: assembly.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// A position in the construct tree through which declarations are registered.
pub struct Scope<'a> {
    tree: &'a mut OutputTree,
    path: Vec<String>,
    owner: Option<String>,
}

impl<'a> Scope<'a> {
    /// Construct path of this scope; empty for the root.
    pub fn path(&self) -> String {
        self.path.join("/")
    }

    pub fn environment(&self) -> &Environment {
        self.tree.environment()
    }

    pub fn tree(&self) -> &OutputTree {
        self.tree
    }

    /// Open a nested scope under `id`.
    pub fn child(&mut self, id: &str) -> ConstructResult<Scope<'_>> {
        self.tree.ensure_usable()?;
        let path = self.reserve(id)?;
        Ok(Scope {
            tree: &mut *self.tree,
            path,
            owner: self.owner.clone(),
        })
    }

    /// Logical id a declaration registered under `id` in this scope would get.
    pub fn logical_id_for(&self, id: &str) -> String {
        naming::logical_id(&self.child_path(id))
    }

    /// Register a declaration under `id` and return its handle.
    pub fn register(&mut self, id: &str, mut declaration: ResourceDeclaration) -> ConstructResult<ResourceHandle> {
        self.tree.ensure_usable()?;
        let owner = self.owner.clone().ok_or_else(|| {
            ConstructError::configuration(
                self.child_path(id).join("/"),
                "resources must be declared inside an assembly",
            )
        })?;

        let path = self.child_path(id);
        let joined = path.join("/");
        for target in declaration.dependencies() {
            if !self.tree.contains(target) {
                return Err(ConstructError::BindingNotFound {
                    resource: joined,
                    target: target.clone(),
                });
            }
        }

        let logical_id = naming::logical_id(&path);
        if logical_id.is_empty() {
            return Err(ConstructError::configuration(
                joined,
                "construct path yields an empty logical id",
            ));
        }
        if self.tree.contains(&logical_id) {
            return Err(ConstructError::NamingCollision {
                scope: self.path(),
                id: id.to_string(),
            });
        }
        self.reserve(id)?;

        debug!("Registering {} '{}' as {}", declaration.kind(), joined, logical_id);
        declaration.logical_id = logical_id.clone();
        declaration.path = joined;
        declaration.owner = owner;
        let handle = declaration.handle();

        self.tree.index.insert(logical_id, self.tree.declarations.len());
        self.tree.declarations.push(declaration);
        Ok(handle)
    }

    pub fn suppress(&mut self, handle: &ResourceHandle, entries: impl IntoIterator<Item = Suppression>) {
        self.tree.suppress(handle, entries);
    }

    /// Run one pattern assembly under `id`.
    ///
    /// The closure builds the pattern's declarations in a child scope owned by
    /// the assembly. Every declaration it created is then validated. The first
    /// error aborts the assembly and leaves the whole tree unusable; nothing is
    /// rolled back.
    pub fn assemble<T, F>(&mut self, id: &str, build: F) -> ConstructResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> ConstructResult<T>,
    {
        self.tree.ensure_usable()?;
        let checkpoint = self.tree.declarations.len();
        let result = self.run_assembly(id, checkpoint, build);
        if let Err(e) = &result {
            let assembly = self.child_path(id).join("/");
            warn!("Assembly '{}' aborted: {}", assembly, e);
            self.tree.aborted = Some(assembly);
        }
        result
    }

    fn run_assembly<T, F>(&mut self, id: &str, checkpoint: usize, build: F) -> ConstructResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> ConstructResult<T>,
    {
        let path = self.reserve(id)?;
        let assembly = path.join("/");
        info!("Assembling '{}'", assembly);

        let exposed = {
            let mut scope = Scope {
                tree: &mut *self.tree,
                path,
                owner: Some(assembly.clone()),
            };
            build(&mut scope)?
        };

        let tree: &OutputTree = self.tree;
        for declaration in &tree.declarations[checkpoint..] {
            validate_declaration(declaration, tree)?;
        }

        info!(
            "Assembled '{}' with {} resources",
            assembly,
            tree.declarations.len() - checkpoint
        );
        Ok(exposed)
    }

    fn child_path(&self, id: &str) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(id.to_string());
        path
    }

    fn reserve(&mut self, id: &str) -> ConstructResult<Vec<String>> {
        if id.is_empty() || id.contains('/') {
            return Err(ConstructError::configuration(
                self.child_path(id).join("/"),
                "construct ids must be non-empty and must not contain '/'",
            ));
        }
        let path = self.child_path(id);
        if !self.tree.paths.insert(path.join("/")) {
            return Err(ConstructError::NamingCollision {
                scope: self.path(),
                id: id.to_string(),
            });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use crate::resource::ResourceKind;
    use crate::suppression::CheckId;

    fn tree() -> OutputTree {
        OutputTree::new(StackConfig::new("test"))
    }

    fn database() -> ResourceDeclaration {
        ResourceDeclaration::new(
            ResourceKind::GlueDatabase,
            Fragment::new()
                .with("CatalogId", "123456789012")
                .with("DatabaseInput", serde_json::json!({})),
        )
    }

    #[test]
    fn test_register_inside_assembly() {
        let mut tree = tree();
        let handle = tree
            .root()
            .assemble("catalog", |scope| scope.register("GlueDatabase", database()))
            .unwrap();

        assert_eq!(handle.logical_id, "catalogGlueDatabase");
        assert_eq!(handle.path, "catalog/GlueDatabase");
        let decl = tree.get("catalogGlueDatabase").unwrap();
        assert_eq!(decl.owner(), "catalog");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_logical_id_known_before_register() {
        let mut tree = tree();
        let (expected, handle) = tree
            .root()
            .assemble("catalog", |scope| {
                let expected = scope.logical_id_for("GlueDatabase");
                Ok((expected, scope.register("GlueDatabase", database())?))
            })
            .unwrap();
        assert_eq!(expected, handle.logical_id);
    }

    #[test]
    fn test_register_outside_assembly_rejected() {
        let mut tree = tree();
        let err = tree.root().register("GlueDatabase", database()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_id_is_naming_collision() {
        let mut tree = tree();
        let err = tree
            .root()
            .assemble("catalog", |scope| {
                scope.register("Db", database())?;
                scope.register("Db", database())
            })
            .unwrap_err();
        assert!(matches!(err, ConstructError::NamingCollision { ref id, .. } if id == "Db"));
    }

    #[test]
    fn test_logical_id_collision_across_paths() {
        let mut tree = tree();
        let err = tree
            .root()
            .assemble("a", |scope| {
                scope.register("b-c", database())?;
                scope.register("bc", database())
            })
            .unwrap_err();
        assert!(matches!(err, ConstructError::NamingCollision { .. }));
    }

    #[test]
    fn test_duplicate_assembly_id() {
        let mut tree = tree();
        tree.root().assemble("one", |_| Ok(())).unwrap();
        let err = tree.root().assemble("one", |_| Ok(())).unwrap_err();
        assert!(matches!(err, ConstructError::NamingCollision { .. }));
    }

    #[test]
    fn test_missing_binding_rejected() {
        let mut tree = tree();
        let ghost = ResourceHandle {
            logical_id: "Ghost".to_string(),
            path: "Ghost".to_string(),
            kind: ResourceKind::GlueDatabase,
        };
        let err = tree
            .root()
            .assemble("catalog", |scope| {
                let table = ResourceDeclaration::new(ResourceKind::GlueTable, Fragment::new())
                    .with_reference("database", &ghost);
                scope.register("Table", table)
            })
            .unwrap_err();
        assert!(matches!(err, ConstructError::BindingNotFound { ref target, .. } if target == "Ghost"));
    }

    #[test]
    fn test_failed_assembly_makes_tree_unusable() {
        let mut tree = tree();
        let result: ConstructResult<()> = tree
            .root()
            .assemble("broken", |_| Err(ConstructError::configuration("x", "bad")));
        assert!(result.is_err());
        assert!(tree.is_aborted());

        let err = tree.root().assemble("next", |_| Ok(())).unwrap_err();
        assert!(matches!(err, ConstructError::AssemblyAborted { ref assembly } if assembly == "broken"));
    }

    #[test]
    fn test_validation_runs_over_new_declarations() {
        let mut tree = tree();
        let err = tree
            .root()
            .assemble("catalog", |scope| {
                scope.register(
                    "Db",
                    ResourceDeclaration::new(ResourceKind::GlueDatabase, Fragment::new()),
                )
            })
            .unwrap_err();
        assert!(matches!(err, ConstructError::Validation { ref path, .. } if path == "CatalogId"));
    }

    #[test]
    fn test_suppress_is_metadata_only() {
        let mut tree = tree();
        let handle = tree
            .root()
            .assemble("catalog", |scope| scope.register("Db", database()))
            .unwrap();
        let before = tree.get(&handle.logical_id).unwrap().properties().clone();

        tree.suppress(&handle, vec![Suppression::new(CheckId::W35, "Test only").unwrap()]);

        let decl = tree.get(&handle.logical_id).unwrap();
        assert_eq!(decl.suppressions().len(), 1);
        assert_eq!(decl.properties(), &before);
    }

    #[test]
    fn test_child_scopes_nest_paths() {
        let mut tree = tree();
        let handle = tree
            .root()
            .assemble("app", |scope| {
                let mut child = scope.child("Catalog")?;
                child.register("Db", database())
            })
            .unwrap();
        assert_eq!(handle.path, "app/Catalog/Db");
        assert_eq!(tree.find_by_path("app/Catalog/Db").map(|d| d.owner()), Some("app"));
    }
}
