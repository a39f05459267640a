//! Category tree
//!
//! Categories nest at most three deep: category, subcategory and
//! sub-subcategory. A node's [`CategoryLevel`] is its depth and is checked
//! against the parent whenever a node is created, moved or assembled into a
//! [`CategoryTree`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use validator::Validate;

use crate::domain::value_objects::slugify;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CategoryLevel {
    Category,
    Subcategory,
    SubSubcategory,
}

impl CategoryLevel {
    pub fn depth(self) -> u8 {
        match self { Self::Category => 0, Self::Subcategory => 1, Self::SubSubcategory => 2 }
    }

    pub fn can_have_children(self) -> bool { self != Self::SubSubcategory }

    /// Level of a child placed under a node of this level.
    pub fn child(self) -> Result<Self, CategoryError> {
        match self {
            Self::Category => Ok(Self::Subcategory),
            Self::Subcategory => Ok(Self::SubSubcategory),
            Self::SubSubcategory => Err(CategoryError::TooDeep),
        }
    }
}

impl TryFrom<u8> for CategoryLevel {
    type Error = CategoryError;
    fn try_from(depth: u8) -> Result<Self, Self::Error> {
        match depth {
            0 => Ok(Self::Category),
            1 => Ok(Self::Subcategory),
            2 => Ok(Self::SubSubcategory),
            _ => Err(CategoryError::TooDeep),
        }
    }
}

impl From<CategoryLevel> for u8 {
    fn from(level: CategoryLevel) -> Self { level.depth() }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent: Option<String>,
    pub level: CategoryLevel,
    #[serde(default)]
    pub order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDraft {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("Category not found")]
    NotFound,
    #[error("Categories can only be nested three levels deep")]
    TooDeep,
    #[error("Category cannot be its own parent")]
    SelfParent,
    #[error("Category '{0}' would become its own ancestor")]
    Cycle(String),
    #[error("Parent '{parent}' of category '{id}' does not exist")]
    Orphan { id: String, parent: String },
    #[error("Category '{id}' has level {found} but sits at depth {expected}")]
    LevelMismatch { id: String, expected: u8, found: u8 },
    #[error("Category has subcategories")]
    HasChildren,
}

impl Category {
    /// Creates a node under `parent`, or a top-level category when `None`.
    pub fn create(id: impl Into<String>, draft: CategoryDraft, parent: Option<&Category>, now: DateTime<Utc>) -> Result<Self, CategoryError> {
        let level = match parent {
            Some(p) => p.level.child()?,
            None => CategoryLevel::Category,
        };
        Ok(Self {
            id: id.into(), slug: slugify(&draft.name), name: draft.name, description: draft.description,
            image: draft.image, parent: parent.map(|p| p.id.clone()), level, order: draft.order,
            is_active: draft.is_active, created_at: now, updated_at: now,
        })
    }

    /// Applies an edit. `tree` is the current catalog, used to check that a
    /// move keeps the tree within three levels and acyclic.
    pub fn apply(&mut self, draft: CategoryDraft, tree: &CategoryTree, now: DateTime<Utc>) -> Result<(), CategoryError> {
        if draft.parent != self.parent {
            let level = match draft.parent.as_deref() {
                Some(parent_id) if parent_id == self.id => return Err(CategoryError::SelfParent),
                Some(parent_id) => {
                    if tree.descendants(&self.id).iter().any(|d| d == parent_id) {
                        return Err(CategoryError::Cycle(self.id.clone()));
                    }
                    tree.get(parent_id).ok_or(CategoryError::NotFound)?.level.child()?
                }
                None => CategoryLevel::Category,
            };
            if level != self.level && tree.has_children(&self.id) {
                return Err(CategoryError::HasChildren);
            }
            self.parent = draft.parent;
            self.level = level;
        }
        self.slug = slugify(&draft.name);
        self.name = draft.name;
        self.description = draft.description;
        self.image = draft.image;
        self.order = draft.order;
        self.is_active = draft.is_active;
        self.updated_at = now;
        Ok(())
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) { self.is_active = !self.is_active; self.updated_at = now; }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Validated category forest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CategoryTree {
    roots: Vec<CategoryNode>,
    index: HashMap<String, Category>,
    children: HashMap<String, Vec<String>>,
}

impl CategoryTree {
    pub fn build(categories: Vec<Category>) -> Result<Self, CategoryError> {
        let index: HashMap<String, Category> = categories.into_iter().map(|c| (c.id.clone(), c)).collect();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for c in index.values() {
            if let Some(parent) = &c.parent {
                if parent == &c.id { return Err(CategoryError::SelfParent); }
                if !index.contains_key(parent) {
                    return Err(CategoryError::Orphan { id: c.id.clone(), parent: parent.clone() });
                }
                children.entry(parent.clone()).or_default().push(c.id.clone());
            }
        }
        for ids in children.values_mut() {
            ids.sort_by(|a, b| {
                let (a, b) = (&index[a], &index[b]);
                (a.order, &a.name).cmp(&(b.order, &b.name))
            });
        }

        let mut root_ids: Vec<&Category> = index.values().filter(|c| c.parent.is_none()).collect();
        root_ids.sort_by(|a, b| (a.order, &a.name).cmp(&(b.order, &b.name)));

        let mut visited = HashSet::new();
        let mut roots = Vec::with_capacity(root_ids.len());
        for root in root_ids {
            roots.push(Self::assemble(&root.id, 0, &index, &children, &mut visited)?);
        }
        // Anything unreached hangs off a parent chain that never reaches a root.
        if let Some(stray) = index.keys().find(|id| !visited.contains(*id)) {
            return Err(CategoryError::Cycle(stray.clone()));
        }

        Ok(Self { roots, index, children })
    }

    fn assemble(
        id: &str,
        depth: u8,
        index: &HashMap<String, Category>,
        children: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
    ) -> Result<CategoryNode, CategoryError> {
        let category = index.get(id).ok_or(CategoryError::NotFound)?;
        if category.level.depth() != depth {
            return Err(CategoryError::LevelMismatch { id: id.to_string(), expected: depth, found: category.level.depth() });
        }
        visited.insert(id.to_string());
        let child_ids = children.get(id).map(Vec::as_slice).unwrap_or_default();
        if !child_ids.is_empty() && !category.level.can_have_children() { return Err(CategoryError::TooDeep); }

        let mut nodes = Vec::with_capacity(child_ids.len());
        for child in child_ids {
            nodes.push(Self::assemble(child, depth + 1, index, children, visited)?);
        }
        Ok(CategoryNode { category: category.clone(), children: nodes })
    }

    pub fn roots(&self) -> &[CategoryNode] { &self.roots }
    pub fn into_roots(self) -> Vec<CategoryNode> { self.roots }
    pub fn len(&self) -> usize { self.index.len() }
    pub fn is_empty(&self) -> bool { self.index.is_empty() }
    pub fn get(&self, id: &str) -> Option<&Category> { self.index.get(id) }
    pub fn has_children(&self, id: &str) -> bool { self.children.get(id).is_some_and(|c| !c.is_empty()) }

    /// Ids of every category below `id`.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(next) = stack.pop() {
            for child in self.children.get(&next).into_iter().flatten() {
                out.push(child.clone());
                stack.push(child.clone());
            }
        }
        out
    }

    /// Breadcrumb from the top-level category down to `id`.
    pub fn path(&self, id: &str) -> Vec<&Category> {
        let mut path = Vec::new();
        let mut cursor = self.index.get(id);
        while let Some(c) = cursor {
            path.push(c);
            cursor = c.parent.as_deref().and_then(|p| self.index.get(p));
        }
        path.reverse();
        path
    }

    /// Same tree without inactive nodes; children of an inactive node go with it.
    pub fn active(&self) -> Vec<CategoryNode> {
        fn prune(nodes: &[CategoryNode]) -> Vec<CategoryNode> {
            nodes
                .iter()
                .filter(|n| n.category.is_active)
                .map(|n| CategoryNode { category: n.category.clone(), children: prune(&n.children) })
                .collect()
        }
        prune(&self.roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, parent: Option<&str>) -> CategoryDraft {
        CategoryDraft { name: name.into(), description: None, image: None, parent: parent.map(Into::into), order: 0, is_active: true }
    }

    fn catalog() -> Vec<Category> {
        let now = Utc::now();
        let floor = Category::create("floor", draft("Floor Tiles", None), None, now).unwrap();
        let vitrified = Category::create("vitrified", draft("Vitrified", Some("floor")), Some(&floor), now).unwrap();
        let gvt = Category::create("gvt", draft("Glazed Vitrified", Some("vitrified")), Some(&vitrified), now).unwrap();
        let wall = Category::create("wall", draft("Wall Tiles", None), None, now).unwrap();
        vec![gvt, wall, vitrified, floor]
    }

    #[test]
    fn test_build_nests_by_level() {
        let tree = CategoryTree::build(catalog()).unwrap();
        assert_eq!(tree.roots().len(), 2);
        let floor = &tree.roots()[0];
        assert_eq!(floor.category.id, "floor");
        assert_eq!(floor.children[0].children[0].category.level, CategoryLevel::SubSubcategory);
        assert_eq!(tree.path("gvt").iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), ["floor", "vitrified", "gvt"]);
        assert_eq!(tree.descendants("floor").len(), 2);
    }

    #[test]
    fn test_fourth_level_rejected_at_construction() {
        let now = Utc::now();
        let cats = catalog();
        let gvt = cats.iter().find(|c| c.id == "gvt").unwrap();
        assert_eq!(Category::create("x", draft("Too Deep", Some("gvt")), Some(gvt), now), Err(CategoryError::TooDeep));
    }

    #[test]
    fn test_build_rejects_bad_levels_and_cycles() {
        let mut cats = catalog();
        cats.iter_mut().find(|c| c.id == "vitrified").unwrap().level = CategoryLevel::Category;
        assert!(matches!(CategoryTree::build(cats), Err(CategoryError::LevelMismatch { .. })));

        let mut cats = catalog();
        cats.iter_mut().find(|c| c.id == "floor").unwrap().parent = Some("gvt".into());
        assert!(matches!(CategoryTree::build(cats), Err(CategoryError::Cycle(_))));

        let mut cats = catalog();
        cats.retain(|c| c.id != "vitrified");
        assert!(matches!(CategoryTree::build(cats), Err(CategoryError::Orphan { .. })));
    }

    #[test]
    fn test_move_rules() {
        let tree = CategoryTree::build(catalog()).unwrap();
        let now = Utc::now();

        let mut floor = tree.get("floor").unwrap().clone();
        assert_eq!(floor.apply(draft("Floor Tiles", Some("gvt")), &tree, now), Err(CategoryError::Cycle("floor".into())));

        let mut vitrified = tree.get("vitrified").unwrap().clone();
        assert_eq!(vitrified.apply(draft("Vitrified", None), &tree, now), Err(CategoryError::HasChildren));
        assert!(vitrified.apply(draft("Vitrified", Some("wall")), &tree, now).is_ok());

        let mut gvt = tree.get("gvt").unwrap().clone();
        gvt.apply(draft("GVT", Some("wall")), &tree, now).unwrap();
        assert_eq!(gvt.level, CategoryLevel::Subcategory);
        assert_eq!(gvt.slug, "gvt");
    }

    #[test]
    fn test_active_prunes_subtrees() {
        let mut cats = catalog();
        cats.iter_mut().find(|c| c.id == "vitrified").unwrap().is_active = false;
        let tree = CategoryTree::build(cats).unwrap();
        let active = tree.active();
        assert!(active.iter().find(|n| n.category.id == "floor").unwrap().children.is_empty());
    }

    #[test]
    fn test_level_wire_format() {
        assert_eq!(serde_json::to_string(&CategoryLevel::Subcategory).unwrap(), "1");
        assert!(serde_json::from_str::<CategoryLevel>("3").is_err());
    }
}
