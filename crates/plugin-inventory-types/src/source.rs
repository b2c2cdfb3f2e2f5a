use serde::{Deserialize, Serialize};

/// A configured source of plugin catalogue data.
///
/// Exactly one variant is populated per instance — this is expressed
/// structurally by the enum rather than by convention, per the design note
/// that replaces the legacy "record with four optional pointer fields"
/// shape with a sum type plus a construction function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoverySource {
    Oci { name: String, image: String },
    Local { name: String, path: String },
    Kubernetes {
        name: String,
        kubeconfig: String,
        context: String,
    },
    Rest {
        name: String,
        endpoint: String,
        base_path: String,
    },
}

impl DiscoverySource {
    pub fn name(&self) -> &str {
        match self {
            DiscoverySource::Oci { name, .. }
            | DiscoverySource::Local { name, .. }
            | DiscoverySource::Kubernetes { name, .. }
            | DiscoverySource::Rest { name, .. } => name,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            DiscoverySource::Oci { .. } => "oci",
            DiscoverySource::Local { .. } => "local",
            DiscoverySource::Kubernetes { .. } => "kubernetes",
            DiscoverySource::Rest { .. } => "rest",
        }
    }
}

/// Legacy on-disk shape: a record with one optional pointer field per
/// variant. [`DiscoverySource::from_raw`] is the total construction
/// function that validates it and rejects records with zero or more than
/// one populated variant, so config files written by older tooling can
/// still be read without silently picking the wrong source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDiscoverySourceRecord {
    pub oci: Option<RawOci>,
    pub local: Option<RawLocal>,
    pub kubernetes: Option<RawKubernetes>,
    pub rest: Option<RawRest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOci {
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLocal {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawKubernetes {
    pub name: String,
    pub kubeconfig: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRest {
    pub name: String,
    pub endpoint: String,
    pub base_path: String,
}

impl DiscoverySource {
    pub fn from_raw(raw: RawDiscoverySourceRecord) -> Result<Self, RawSourceError> {
        let populated = [
            raw.oci.is_some(),
            raw.local.is_some(),
            raw.kubernetes.is_some(),
            raw.rest.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();

        match populated {
            0 => Err(RawSourceError::NoVariantPopulated),
            1 => Ok(if let Some(o) = raw.oci {
                DiscoverySource::Oci {
                    name: o.name,
                    image: o.image,
                }
            } else if let Some(l) = raw.local {
                DiscoverySource::Local {
                    name: l.name,
                    path: l.path,
                }
            } else if let Some(k) = raw.kubernetes {
                DiscoverySource::Kubernetes {
                    name: k.name,
                    kubeconfig: k.kubeconfig,
                    context: k.context,
                }
            } else {
                let r = raw.rest.expect("exactly one variant populated");
                DiscoverySource::Rest {
                    name: r.name,
                    endpoint: r.endpoint,
                    base_path: r.base_path,
                }
            }),
            _ => Err(RawSourceError::MultipleVariantsPopulated),
        }
    }
}

impl DiscoverySource {
    /// Inverse of [`DiscoverySource::from_raw`], used when writing a config
    /// file back out: each variant populates exactly the one matching
    /// optional field.
    pub fn to_raw(&self) -> RawDiscoverySourceRecord {
        match self {
            DiscoverySource::Oci { name, image } => RawDiscoverySourceRecord {
                oci: Some(RawOci {
                    name: name.clone(),
                    image: image.clone(),
                }),
                ..Default::default()
            },
            DiscoverySource::Local { name, path } => RawDiscoverySourceRecord {
                local: Some(RawLocal {
                    name: name.clone(),
                    path: path.clone(),
                }),
                ..Default::default()
            },
            DiscoverySource::Kubernetes {
                name,
                kubeconfig,
                context,
            } => RawDiscoverySourceRecord {
                kubernetes: Some(RawKubernetes {
                    name: name.clone(),
                    kubeconfig: kubeconfig.clone(),
                    context: context.clone(),
                }),
                ..Default::default()
            },
            DiscoverySource::Rest {
                name,
                endpoint,
                base_path,
            } => RawDiscoverySourceRecord {
                rest: Some(RawRest {
                    name: name.clone(),
                    endpoint: endpoint.clone(),
                    base_path: base_path.clone(),
                }),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RawSourceError {
    #[error("discovery source record has no populated variant")]
    NoVariantPopulated,
    #[error("discovery source record has more than one populated variant")]
    MultipleVariantsPopulated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_record() {
        let raw = RawDiscoverySourceRecord::default();
        assert_eq!(
            DiscoverySource::from_raw(raw).unwrap_err(),
            RawSourceError::NoVariantPopulated
        );
    }

    #[test]
    fn rejects_multiple_populated_variants() {
        let raw = RawDiscoverySourceRecord {
            oci: Some(RawOci {
                name: "a".into(),
                image: "img".into(),
            }),
            local: Some(RawLocal {
                name: "a".into(),
                path: "/tmp".into(),
            }),
            ..Default::default()
        };
        assert_eq!(
            DiscoverySource::from_raw(raw).unwrap_err(),
            RawSourceError::MultipleVariantsPopulated
        );
    }

    #[test]
    fn accepts_single_populated_variant() {
        let raw = RawDiscoverySourceRecord {
            oci: Some(RawOci {
                name: "central".into(),
                image: "registry/plugins:latest".into(),
            }),
            ..Default::default()
        };
        let source = DiscoverySource::from_raw(raw).unwrap();
        assert_eq!(source.name(), "central");
        assert_eq!(source.type_tag(), "oci");
    }

    #[test]
    fn to_raw_then_from_raw_round_trips_every_variant() {
        let sources = [
            DiscoverySource::Oci {
                name: "central".into(),
                image: "registry/plugins:latest".into(),
            },
            DiscoverySource::Local {
                name: "offline".into(),
                path: "/mnt/plugins".into(),
            },
            DiscoverySource::Kubernetes {
                name: "prod".into(),
                kubeconfig: "/home/user/.kube/config".into(),
                context: "prod-cluster".into(),
            },
            DiscoverySource::Rest {
                name: "catalog".into(),
                endpoint: "https://catalog.example".into(),
                base_path: "/v1/plugins".into(),
            },
        ];
        for source in sources {
            let round_tripped = DiscoverySource::from_raw(source.to_raw()).unwrap();
            assert_eq!(round_tripped, source);
        }
    }
}
