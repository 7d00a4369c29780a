use kube_mgmt_k8s_api::{Label, ResourceExt};

pub const POLICY_LABEL_KEY: &str = "openpolicyagent.org/policy";
pub const POLICY_LABEL_VALUE: &str = "rego";

pub const DATA_LABEL_KEY: &str = "openpolicyagent.org/data";
pub const DATA_LABEL_VALUE: &str = "opa";

pub const POLICY_STATUS_ANNOTATION: &str = "openpolicyagent.org/policy-status";
pub const DATA_STATUS_ANNOTATION: &str = "openpolicyagent.org/data-status";

/// Namespace list entry selecting every namespace.
pub const ALL_NAMESPACES: &str = "*";

/// How a selected configuration object's content is loaded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Each entry is policy source text.
    Policy,
    /// Each entry is a JSON document.
    Data,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Namespaces whose objects are selected; `*` selects all of them.
    pub namespaces: Vec<String>,
    /// Only objects carrying `policy_label` are loaded as policies.
    pub require_policy_label: bool,
    pub enable_policies: bool,
    pub enable_data: bool,
    pub policy_label: Label,
    /// When the policy label is not required, objects that carry it anyway
    /// are loaded as policies even outside of `namespaces`.
    pub policy_label_bypasses_namespace: bool,
}

/// Decides whether a configuration object is loaded and in which role.
#[derive(Clone, Debug)]
pub struct Classifier {
    config: ClassifierConfig,
    data_label: Label,
}

// === impl Role ===

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Data => "data",
        }
    }

    /// The annotation reporting the sync status of objects in this role.
    pub fn status_annotation(&self) -> &'static str {
        match self {
            Self::Policy => POLICY_STATUS_ANNOTATION,
            Self::Data => DATA_STATUS_ANNOTATION,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ClassifierConfig ===

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![ALL_NAMESPACES.to_string()],
            require_policy_label: false,
            enable_policies: true,
            enable_data: true,
            policy_label: Label::new(POLICY_LABEL_KEY, POLICY_LABEL_VALUE),
            policy_label_bypasses_namespace: false,
        }
    }
}

impl ClassifierConfig {
    pub fn selects_all_namespaces(&self) -> bool {
        self.namespaces.iter().any(|ns| ns == ALL_NAMESPACES)
    }
}

// === impl Classifier ===

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            data_label: Label::new(DATA_LABEL_KEY, DATA_LABEL_VALUE),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Returns the object's role, or `None` if it is not loaded at all.
    pub fn classify<K: ResourceExt>(&self, obj: &K) -> Option<Role> {
        let labels = obj.labels();
        let in_namespace = self.in_namespace(obj.namespace().as_deref().unwrap_or_default());

        if self.config.enable_data && in_namespace && self.data_label.matches(labels) {
            return Some(Role::Data);
        }

        if self.config.enable_policies {
            let labeled = self.config.policy_label.matches(labels);
            let selected = if self.config.require_policy_label {
                in_namespace && labeled
            } else {
                in_namespace || (labeled && self.config.policy_label_bypasses_namespace)
            };
            if selected {
                return Some(Role::Policy);
            }
        }

        None
    }

    fn in_namespace(&self, namespace: &str) -> bool {
        self.config
            .namespaces
            .iter()
            .any(|ns| ns == ALL_NAMESPACES || ns == namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_mgmt_k8s_api::{ConfigMap, ObjectMeta};
    use maplit::btreemap;

    const NS: &str = "ns1";

    fn configmap(labels: Option<(&str, &str)>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cm".to_string()),
                namespace: Some(NS.to_string()),
                labels: labels.map(|(k, v)| btreemap! { k.to_string() => v.to_string() }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A policy matcher configuration, the label the object is given, and
    /// whether the unlabeled and labeled objects are expected to be loaded
    /// as policies.
    struct PolicyCase {
        namespace: &'static str,
        enable_policies: bool,
        require_policy_label: bool,
        policy_label: (&'static str, &'static str),
        object_label: (&'static str, &'static str),
        match_unlabeled: bool,
        match_labeled: bool,
    }

    impl PolicyCase {
        fn classifier(&self, bypass: bool) -> Classifier {
            Classifier::new(ClassifierConfig {
                namespaces: vec![self.namespace.to_string()],
                require_policy_label: self.require_policy_label,
                enable_policies: self.enable_policies,
                enable_data: true,
                policy_label: Label::new(self.policy_label.0, self.policy_label.1),
                policy_label_bypasses_namespace: bypass,
            })
        }
    }

    #[test]
    fn policy_matrix() {
        const DEFAULT: (&str, &str) = (POLICY_LABEL_KEY, POLICY_LABEL_VALUE);
        const OTHER: (&str, &str) = ("other_key", "other_value");

        #[rustfmt::skip]
        let cases = [
            // namespace, enable, require, configured label, object label, unlabeled, labeled
            (NS, true, true, DEFAULT, DEFAULT, false, true),
            (NS, true, true, OTHER, OTHER, false, true),
            (NS, true, true, DEFAULT, OTHER, false, false),
            (NS, true, false, DEFAULT, DEFAULT, true, true),
            (NS, true, false, OTHER, OTHER, true, true),
            (NS, true, false, DEFAULT, OTHER, true, true),
            (NS, false, true, DEFAULT, DEFAULT, false, false),
            (NS, false, true, OTHER, OTHER, false, false),
            (NS, false, true, DEFAULT, OTHER, false, false),
            (NS, false, false, DEFAULT, DEFAULT, false, false),
            (NS, false, false, OTHER, OTHER, false, false),
            (NS, false, false, DEFAULT, OTHER, false, false),
            ("*", true, true, DEFAULT, DEFAULT, false, true),
            ("*", true, true, OTHER, OTHER, false, true),
            ("*", true, true, DEFAULT, OTHER, false, false),
            ("*", true, false, DEFAULT, DEFAULT, true, true),
            ("*", true, false, OTHER, OTHER, true, true),
            ("*", true, false, DEFAULT, OTHER, true, true),
            ("*", false, true, DEFAULT, DEFAULT, false, false),
            ("*", false, true, OTHER, OTHER, false, false),
            ("*", false, true, DEFAULT, OTHER, false, false),
            ("*", false, false, DEFAULT, DEFAULT, false, false),
            ("*", false, false, OTHER, OTHER, false, false),
            ("*", false, false, DEFAULT, OTHER, false, false),
            ("different_ns", true, true, DEFAULT, DEFAULT, false, false),
            ("different_ns", true, true, OTHER, OTHER, false, false),
            ("different_ns", true, true, DEFAULT, OTHER, false, false),
            // A labeled object outside the namespace only matches with the
            // bypass enabled; see `namespace_bypass`.
            ("different_ns", true, false, DEFAULT, DEFAULT, false, false),
            ("different_ns", true, false, OTHER, OTHER, false, false),
            ("different_ns", true, false, DEFAULT, OTHER, false, false),
            ("different_ns", false, true, DEFAULT, DEFAULT, false, false),
            ("different_ns", false, true, OTHER, OTHER, false, false),
            ("different_ns", false, true, DEFAULT, OTHER, false, false),
            ("different_ns", false, false, DEFAULT, DEFAULT, false, false),
            ("different_ns", false, false, OTHER, OTHER, false, false),
            ("different_ns", false, false, DEFAULT, OTHER, false, false),
        ];

        for (i, (namespace, enable, require, configured, label, unlabeled, labeled)) in
            cases.into_iter().enumerate()
        {
            let case = PolicyCase {
                namespace,
                enable_policies: enable,
                require_policy_label: require,
                policy_label: configured,
                object_label: label,
                match_unlabeled: unlabeled,
                match_labeled: labeled,
            };
            let classifier = case.classifier(false);

            let expected = case.match_unlabeled.then_some(Role::Policy);
            assert_eq!(
                classifier.classify(&configmap(None)),
                expected,
                "case {i}: unlabeled object"
            );

            let expected = case.match_labeled.then_some(Role::Policy);
            assert_eq!(
                classifier.classify(&configmap(Some(case.object_label))),
                expected,
                "case {i}: labeled object"
            );
        }
    }

    #[test]
    fn namespace_bypass() {
        let case = PolicyCase {
            namespace: "different_ns",
            enable_policies: true,
            require_policy_label: false,
            policy_label: (POLICY_LABEL_KEY, POLICY_LABEL_VALUE),
            object_label: (POLICY_LABEL_KEY, POLICY_LABEL_VALUE),
            match_unlabeled: false,
            match_labeled: true,
        };
        let classifier = case.classifier(true);
        assert_eq!(classifier.classify(&configmap(None)), None);
        assert_eq!(
            classifier.classify(&configmap(Some(case.object_label))),
            Some(Role::Policy)
        );
        assert!(case.match_labeled && !case.match_unlabeled);

        // A mismatched label does not bypass the namespace.
        assert_eq!(
            classifier.classify(&configmap(Some(("other_key", "other_value")))),
            None
        );

        // Nor does the bypass apply when the label is required.
        let case = PolicyCase {
            require_policy_label: true,
            ..case
        };
        assert_eq!(
            case.classifier(true)
                .classify(&configmap(Some(case.object_label))),
            None
        );
    }

    #[test]
    fn data_matrix() {
        let data_label = Some((DATA_LABEL_KEY, DATA_LABEL_VALUE));
        for (title, namespace, enable_data, matches) in [
            ("same namespace, data enabled", NS, true, true),
            ("same namespace, data disabled", NS, false, false),
            ("any namespace, data enabled", "*", true, true),
            ("any namespace, data disabled", "*", false, false),
            ("other namespace, data enabled", "other", true, false),
            ("other namespace, data disabled", "other", false, false),
        ] {
            let classifier = Classifier::new(ClassifierConfig {
                namespaces: vec![namespace.to_string()],
                require_policy_label: true,
                enable_policies: true,
                enable_data,
                ..Default::default()
            });
            assert_eq!(
                classifier.classify(&configmap(data_label)),
                matches.then_some(Role::Data),
                "{title}"
            );
            assert_eq!(classifier.classify(&configmap(None)), None, "{title}: unlabeled");
        }
    }

    #[test]
    fn data_label_wins_over_policy_label_state() {
        for require_policy_label in [true, false] {
            let classifier = Classifier::new(ClassifierConfig {
                require_policy_label,
                ..Default::default()
            });
            assert_eq!(
                classifier.classify(&configmap(Some((DATA_LABEL_KEY, DATA_LABEL_VALUE)))),
                Some(Role::Data)
            );
        }
    }

    #[test]
    fn data_label_value_must_match() {
        let classifier = Classifier::new(ClassifierConfig {
            require_policy_label: true,
            ..Default::default()
        });
        assert_eq!(
            classifier.classify(&configmap(Some((DATA_LABEL_KEY, "other")))),
            None
        );
    }

    #[test]
    fn disabled_data_falls_back_to_policy() {
        let classifier = Classifier::new(ClassifierConfig {
            enable_data: false,
            ..Default::default()
        });
        assert_eq!(
            classifier.classify(&configmap(Some((DATA_LABEL_KEY, DATA_LABEL_VALUE)))),
            Some(Role::Policy)
        );
    }

    #[test]
    fn policies_disabled_never_select_policies() {
        for require_policy_label in [true, false] {
            for bypass in [true, false] {
                let classifier = Classifier::new(ClassifierConfig {
                    enable_policies: false,
                    require_policy_label,
                    policy_label_bypasses_namespace: bypass,
                    ..Default::default()
                });
                for label in [None, Some((POLICY_LABEL_KEY, POLICY_LABEL_VALUE))] {
                    assert_eq!(classifier.classify(&configmap(label)), None);
                }
            }
        }
    }
}
