//! The read-only type information the SQL compiler and validation consult.
//!  Callers usually implement [TypeCatalog] over their own metadata;
//!  [EntityTypeDef] is a small builder-based implementation.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::ast::{Lambda, Node, Property, PropertyKind};
use crate::value::ValueKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("property '{name}' not found on '{entity_set}'")]
    PropertyNotFound { entity_set: String, name: String },
    #[error("property '{name}' cannot be used in $filter")]
    PropertyNotFilterable { name: String },
    #[error("property '{name}' cannot be used in $search")]
    PropertyNotSearchable { name: String },
    #[error("'{name}' is not a navigation property")]
    NotANavigation { name: String },
    #[error("navigation property '{name}' cannot be used as a value")]
    NotAPrimitive { name: String },
    #[error("'{entity_set}' has no searchable properties")]
    NoSearchableProperties { entity_set: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Declared,
    Navigation,
}

/// `property` on the source entity must equal `referenced_property` on the
///  navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferentialConstraint {
    pub property: String,
    pub referenced_property: String,
}

#[derive(Clone, Copy)]
pub struct PropertyDescriptor<'a> {
    pub name: &'a str,
    /// Column backing the property
    pub column: &'a str,
    pub kind: DescriptorKind,
    pub primitive_type: Option<ValueKind>,
    pub filterable: bool,
    pub searchable: bool,
    pub navigation_target: Option<&'a dyn TypeCatalog>,
    /// Combined with OR. Empty for declared properties.
    pub referential_constraints: &'a [ReferentialConstraint],
}

impl Debug for PropertyDescriptor<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .field("primitive_type", &self.primitive_type)
            .field("filterable", &self.filterable)
            .field("searchable", &self.searchable)
            .field(
                "navigation_target",
                &self.navigation_target.map(|t| t.entity_set()),
            )
            .field("referential_constraints", &self.referential_constraints)
            .finish()
    }
}

pub trait TypeCatalog {
    /// The table holding this entity type
    fn entity_set(&self) -> &str;

    fn resolve_property(&self, name: &str) -> Option<PropertyDescriptor<'_>>;

    fn property_names(&self) -> Vec<&str>;

    fn resolve(&self, name: &str) -> Result<PropertyDescriptor<'_>, Error> {
        self.resolve_property(name)
            .ok_or_else(|| Error::PropertyNotFound {
                entity_set: self.entity_set().to_string(),
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: String,
    column: String,
    kind: DescriptorKind,
    primitive_type: Option<ValueKind>,
    filterable: bool,
    searchable: bool,
    target: Option<Arc<EntityTypeDef>>,
    constraints: Vec<ReferentialConstraint>,
}

impl PropertyDef {
    /// A filterable, non-searchable primitive property stored in a column of
    ///  the same name.
    pub fn declared(name: impl Into<String>, primitive_type: ValueKind) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            kind: DescriptorKind::Declared,
            primitive_type: Some(primitive_type),
            filterable: true,
            searchable: false,
            target: None,
            constraints: Vec::new(),
        }
    }

    pub fn navigation(name: impl Into<String>, target: Arc<EntityTypeDef>) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            kind: DescriptorKind::Navigation,
            primitive_type: None,
            filterable: true,
            searchable: false,
            target: Some(target),
            constraints: Vec::new(),
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn not_filterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    pub fn constraint(
        mut self,
        property: impl Into<String>,
        referenced_property: impl Into<String>,
    ) -> Self {
        self.constraints.push(ReferentialConstraint {
            property: property.into(),
            referenced_property: referenced_property.into(),
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct EntityTypeDef {
    entity_set: String,
    properties: Vec<PropertyDef>,
}

impl EntityTypeDef {
    pub fn new(entity_set: impl Into<String>) -> Self {
        Self {
            entity_set: entity_set.into(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }
}

impl TypeCatalog for EntityTypeDef {
    fn entity_set(&self) -> &str {
        &self.entity_set
    }

    fn resolve_property(&self, name: &str) -> Option<PropertyDescriptor<'_>> {
        let def = self.properties.iter().find(|p| p.name == name)?;
        Some(PropertyDescriptor {
            name: &def.name,
            column: &def.column,
            kind: def.kind,
            primitive_type: def.primitive_type,
            filterable: def.filterable,
            searchable: def.searchable,
            navigation_target: def.target.as_deref().map(|t| t as &dyn TypeCatalog),
            referential_constraints: &def.constraints,
        })
    }

    fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Checks that every property a `$filter` touches exists and is filterable.
///  Names inside a lambda predicate resolve against the navigation target
///  when qualified by the lambda variable and against [catalog] otherwise.
///  `$compute` and `$orderby` expressions go through the same check.
pub fn validate_filter(node: &Node, catalog: &dyn TypeCatalog) -> Result<(), Error> {
    let mut scopes = Vec::new();
    validate(node, catalog, &mut scopes)
}

fn validate<'a>(
    node: &Node,
    root: &'a dyn TypeCatalog,
    scopes: &mut Vec<(String, &'a dyn TypeCatalog)>,
) -> Result<(), Error> {
    match node {
        Node::Literal(_) => Ok(()),
        Node::Property(property) => {
            let Some(catalog) = scope_catalog(property, root, scopes)? else {
                // Computed properties were validated where they were defined
                return Ok(());
            };
            let descriptor = catalog.resolve(&property.name)?;
            if descriptor.kind == DescriptorKind::Navigation {
                return Err(Error::NotAPrimitive {
                    name: property.name.clone(),
                });
            }
            if !descriptor.filterable {
                return Err(Error::PropertyNotFilterable {
                    name: property.name.clone(),
                });
            }
            Ok(())
        }
        Node::UnaryOperator(_, child) => validate(child, root, scopes),
        Node::BinaryOperator(l, _, r) => {
            validate(l, root, scopes)?;
            validate(r, root, scopes)
        }
        Node::FunctionCall(call) => call
            .args()
            .iter()
            .try_for_each(|arg| validate(arg, root, scopes)),
        Node::List(items) => items.iter().try_for_each(|item| validate(item, root, scopes)),
        Node::Lambda(lambda) => validate_lambda(lambda, root, scopes),
    }
}

fn validate_lambda<'a>(
    lambda: &Lambda,
    root: &'a dyn TypeCatalog,
    scopes: &mut Vec<(String, &'a dyn TypeCatalog)>,
) -> Result<(), Error> {
    let Some(source) = scope_catalog(&lambda.navigation, root, scopes)? else {
        return Err(Error::NotANavigation {
            name: lambda.navigation.name.clone(),
        });
    };
    let descriptor = source.resolve(&lambda.navigation.name)?;
    let Some(target) = descriptor.navigation_target else {
        return Err(Error::NotANavigation {
            name: lambda.navigation.name.clone(),
        });
    };
    let Some(predicate) = &lambda.predicate else {
        return Ok(());
    };
    scopes.push((lambda.variable.clone(), target));
    let res = validate(predicate, root, scopes);
    scopes.pop();
    res
}

/// The catalog a property path starts from. None for computed properties.
fn scope_catalog<'a>(
    property: &Property,
    root: &'a dyn TypeCatalog,
    scopes: &[(String, &'a dyn TypeCatalog)],
) -> Result<Option<&'a dyn TypeCatalog>, Error> {
    match &property.kind {
        PropertyKind::Declared | PropertyKind::Navigation => Ok(Some(root)),
        PropertyKind::Computed => Ok(None),
        PropertyKind::LambdaVariable(variable) => scopes
            .iter()
            .rev()
            .find(|(v, _)| v == variable)
            .map(|(_, catalog)| Some(*catalog))
            .ok_or_else(|| Error::PropertyNotFound {
                entity_set: root.entity_set().to_string(),
                name: format!("{variable}/{}", property.name),
            }),
    }
}

/// The properties a `$search` looks at: [explicit] ones when given (each
///  must be searchable), otherwise every searchable property of [catalog].
pub fn search_properties<'a>(
    catalog: &'a dyn TypeCatalog,
    explicit: Option<&[&str]>,
) -> Result<Vec<PropertyDescriptor<'a>>, Error> {
    let properties = match explicit {
        Some(names) => names
            .iter()
            .map(|name| {
                let descriptor = catalog.resolve(name)?;
                if !descriptor.searchable {
                    return Err(Error::PropertyNotSearchable {
                        name: name.to_string(),
                    });
                }
                Ok(descriptor)
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => catalog
            .property_names()
            .into_iter()
            .filter_map(|name| catalog.resolve_property(name))
            .filter(|d| d.searchable)
            .collect(),
    };
    if properties.is_empty() {
        return Err(Error::NoSearchableProperties {
            entity_set: catalog.entity_set().to_string(),
        });
    }
    Ok(properties)
}
