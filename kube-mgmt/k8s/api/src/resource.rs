use kube::ResourceExt;
use std::fmt;

/// Identifies a watched resource type, optionally constrained to a single
/// namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    /// The plural resource name, e.g. `pods`.
    pub resource: String,
    pub namespaced: bool,
    /// Only meaningful when `namespaced` is set.
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{0:?}: format: [group/]version/resource[:namespace]")]
    BadFormat(String),

    #[error("{0:?}: cluster-scoped resources cannot be constrained to a namespace")]
    UnexpectedNamespace(String),
}

/// Returns the path under which an object's content is stored: `name` for
/// cluster-scoped objects, `namespace/name` otherwise.
pub fn object_path<K: ResourceExt>(obj: &K) -> String {
    let name = obj.name_any();
    match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name,
    }
}

// === impl ResourceType ===

impl ResourceType {
    /// Parses `[group/]version/resource[:namespace]`. Every segment is
    /// lowercased; `:*` is the same as no namespace constraint.
    pub fn parse(value: &str, namespaced: bool) -> Result<Self, ParseError> {
        let bad_format = || ParseError::BadFormat(value.to_string());

        let parts = value
            .splitn(3, '/')
            .map(|p| (!p.is_empty()).then(|| p.to_lowercase()).ok_or_else(bad_format))
            .collect::<Result<Vec<_>, _>>()?;

        let (group, version, resource) = match parts.as_slice() {
            [version, resource] => (String::new(), version.clone(), resource.clone()),
            [group, version, resource] => (group.clone(), version.clone(), resource.clone()),
            _ => return Err(bad_format()),
        };

        let (resource, namespace) = match resource.split_once(':') {
            None => (resource, None),
            Some((resource, ns)) => {
                if resource.is_empty() || ns.is_empty() {
                    return Err(bad_format());
                }
                if !namespaced {
                    return Err(ParseError::UnexpectedNamespace(value.to_string()));
                }
                let ns = (ns != "*").then(|| ns.to_string());
                (resource.to_string(), ns)
            }
        };
        if resource.contains('/') {
            return Err(bad_format());
        }

        Ok(Self {
            group,
            version,
            resource,
            namespaced,
            namespace,
        })
    }

    /// The namespace this type is constrained to, or `None` for all.
    pub fn namespace(&self) -> Option<&str> {
        if !self.namespaced {
            return None;
        }
        match self.namespace.as_deref() {
            None | Some("") | Some("*") => None,
            ns => ns,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [&self.group, &self.version, &self.resource];
        let mut parts = parts.iter().filter(|p| !p.is_empty());
        if let Some(first) = parts.next() {
            write!(f, "{first}")?;
            for part in parts {
                write!(f, "/{part}")?;
            }
        }
        if let Some(ns) = self.namespace() {
            write!(f, ":{ns}")?;
        }
        Ok(())
    }
}
