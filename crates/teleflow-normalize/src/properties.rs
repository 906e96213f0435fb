//! Properties definitions: which stats the system info record holds and
//! how each is normalized from its endpoint's response.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::classifier::{ClassificationDef, EVENT_CATEGORY_KEY};
use crate::error::{NormalizeError, Result};
use crate::filter::KeyFilter;
use crate::functions::NormalizeFunction;
use crate::pipeline::{normalize_data, DataOptions, KEY_SEPARATOR, MISSING_DATA};
use crate::reduce::{ArrayToMap, ReduceOptions};
use crate::rename::RenamePatterns;
use crate::tagger::{EventTagger, TagSet, SYSTEM_INFO_CATEGORY};

const EMBEDDED_PROPERTIES: &str = include_str!("../definitions/properties.json");

#[derive(Debug, Clone, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub global: GlobalProperties,
    #[serde(default)]
    pub events: EventProperties,
    /// Stat name to definition, in record order.
    pub stats: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalProperties {
    #[serde(default)]
    pub add_keys_by_tag: Option<TagsDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagsDefinition {
    pub tags: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventProperties {
    /// Classification rules added to the built-in ones.
    #[serde(default)]
    pub rules: Vec<ClassificationDef>,
    #[serde(default)]
    pub default_category: Option<String>,
    #[serde(default)]
    pub rename_keys: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatDefinition {
    /// `endpoint::segment::...`
    pub key: String,
    /// Tag every item of this stat with the global tags.
    #[serde(default)]
    pub add_keys_by_tag: bool,
    #[serde(default)]
    pub convert_array_to_map: Option<ArrayToMap>,
    #[serde(default)]
    pub normalization: Vec<NormalizationStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NormalizationStep {
    #[serde(default)]
    pub filter_keys: Option<Value>,
    #[serde(default)]
    pub rename_keys: Option<Value>,
    #[serde(default)]
    pub run_functions: Vec<Value>,
}

impl StatDefinition {
    /// Endpoint part of the key and the path inside its response.
    pub fn split_key(&self) -> (&str, Option<&str>) {
        match self.key.split_once(KEY_SEPARATOR) {
            Some((endpoint, rest)) => (endpoint, Some(rest)),
            None => (self.key.as_str(), None),
        }
    }

    pub fn data_options(&self) -> Result<DataOptions> {
        let mut opts = DataOptions {
            key: self.split_key().1.map(str::to_string),
            reduce: ReduceOptions {
                convert_array_to_map: self.convert_array_to_map.clone(),
            },
            ..Default::default()
        };
        for step in &self.normalization {
            if let Some(def) = &step.filter_keys {
                if opts.filter.is_some() {
                    return Err(NormalizeError::Definition(
                        "only one filterKeys step is allowed".into(),
                    ));
                }
                opts.filter = Some(KeyFilter::from_definition(def)?);
            }
            if let Some(def) = &step.rename_keys {
                let patterns = RenamePatterns::from_definition(def)?;
                match &mut opts.rename {
                    Some(existing) => existing.extend(patterns),
                    None => opts.rename = Some(patterns),
                }
            }
            for def in &step.run_functions {
                opts.functions.push(NormalizeFunction::from_definition(def)?);
            }
        }
        Ok(opts)
    }
}

impl Properties {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The built-in definitions.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_PROPERTIES)
    }

    /// Parsed stat definitions in record order.
    pub fn stat_definitions(&self) -> Result<Vec<(String, StatDefinition)>> {
        self.stats
            .iter()
            .map(|(name, def)| {
                let def = serde_json::from_value(def.clone()).map_err(|e| NormalizeError::Stat {
                    stat: name.clone(),
                    source: Box::new(NormalizeError::Definition(e.to_string())),
                })?;
                Ok((name.clone(), def))
            })
            .collect()
    }

    pub fn global_tags(&self) -> Result<Option<TagSet>> {
        self.global
            .add_keys_by_tag
            .as_ref()
            .map(|d| TagSet::from_value(&d.tags))
            .transpose()
    }
}

#[derive(Debug, Clone)]
struct StatPlan {
    name: String,
    endpoint: String,
    options: DataOptions,
}

/// Builds the system info record from a map of endpoint → raw response.
#[derive(Debug, Clone)]
pub struct StatsProcessor {
    plans: Vec<StatPlan>,
    tagger: EventTagger,
    tags: TagSet,
}

impl StatsProcessor {
    pub fn new(properties: &Properties) -> Result<Self> {
        let definitions = properties.stat_definitions()?;
        let tagger = EventTagger::new(
            definitions
                .iter()
                .filter(|(_, d)| d.add_keys_by_tag)
                .map(|(name, _)| name.clone()),
        );
        let plans = definitions
            .into_iter()
            .map(|(name, def)| {
                let options = def.data_options().map_err(|e| NormalizeError::Stat {
                    stat: name.clone(),
                    source: Box::new(e),
                })?;
                Ok(StatPlan {
                    endpoint: def.split_key().0.to_string(),
                    name,
                    options,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            plans,
            tagger,
            tags: properties.global_tags()?.unwrap_or_default(),
        })
    }

    pub fn tagger(&self) -> &EventTagger {
        &self.tagger
    }

    /// Endpoints the definitions read, without duplicates.
    pub fn endpoints(&self) -> Vec<&str> {
        let mut endpoints: Vec<&str> = Vec::new();
        for plan in &self.plans {
            if !endpoints.contains(&plan.endpoint.as_str()) {
                endpoints.push(&plan.endpoint);
            }
        }
        endpoints
    }

    pub fn process(&self, raw: &Value) -> Result<Value> {
        let mut record = Map::new();
        for plan in &self.plans {
            let value = match raw.get(&plan.endpoint) {
                Some(response) => normalize_data(response.clone(), &plan.options, &self.tagger)
                    .map_err(|e| NormalizeError::Stat {
                        stat: plan.name.clone(),
                        source: Box::new(e),
                    })?,
                None => {
                    debug!(stat = %plan.name, endpoint = %plan.endpoint, "no response for endpoint");
                    Value::String(MISSING_DATA.to_string())
                }
            };
            record.insert(plan.name.clone(), value);
        }
        record.insert(
            EVENT_CATEGORY_KEY.to_string(),
            Value::String(SYSTEM_INFO_CATEGORY.to_string()),
        );
        let mut record = Value::Object(record);
        self.tagger.add_tags(&mut record, &self.tags, None);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_responses() -> Value {
        json!({
            "/mgmt/tm/sys/global-settings": {"hostname": "bigip1.example.com"},
            "/mgmt/tm/sys/host-info": {
                "entries": {
                    "https://localhost/mgmt/tm/sys/host-info/0": {
                        "nestedStats": {"entries": {
                            "memoryTotal": {"value": 400},
                            "memoryUsed": {"value": 100},
                            "cpuInfo": {"nestedStats": {"entries": {
                                "https://localhost/mgmt/tm/sys/host-info/0/cpuInfo/0":
                                    {"nestedStats": {"entries": {"oneMinAvgSystem": {"value": 4}}}},
                                "https://localhost/mgmt/tm/sys/host-info/0/cpuInfo/1":
                                    {"nestedStats": {"entries": {"oneMinAvgSystem": {"value": 8}}}}
                            }}}
                        }}
                    }
                }
            },
            "/mgmt/tm/ltm/virtual/stats": {
                "entries": {
                    "https://localhost/mgmt/tm/ltm/virtual/~Common~app~vs/stats": {
                        "nestedStats": {"entries": {
                            "clientside.curConns": {"value": 3},
                            "cmpEnabled": {"description": "enabled"},
                            "tmName": {"description": "/Common/app/vs"}
                        }}
                    }
                }
            }
        })
    }

    #[test]
    fn embedded_properties_parse() {
        let props = Properties::embedded().unwrap();
        let defs = props.stat_definitions().unwrap();
        assert_eq!(defs[0].0, "hostname");
        for (_, def) in &defs {
            def.data_options().unwrap();
        }
        assert!(props.global_tags().unwrap().is_some());
    }

    #[test]
    fn system_info_record() {
        let processor = StatsProcessor::new(&Properties::embedded().unwrap()).unwrap();
        let record = processor.process(&raw_responses()).unwrap();

        assert_eq!(record["telemetryEventCategory"], "systemInfo");
        assert_eq!(record["hostname"], "bigip1.example.com");
        assert_eq!(record["memory"], 25);
        assert_eq!(record["cpu"], 6);
        assert_eq!(record["version"], MISSING_DATA);
        assert_eq!(record["pools"], MISSING_DATA);
        assert_eq!(
            record["virtualServers"],
            json!({"/Common/app/vs": {
                "clientside.curConns": 3,
                "name": "/Common/app/vs",
                "tenant": "Common",
                "application": "app"
            }})
        );
    }

    #[test]
    fn endpoints_deduplicated() {
        let processor = StatsProcessor::new(&Properties::embedded().unwrap()).unwrap();
        let endpoints = processor.endpoints();
        assert_eq!(
            endpoints.iter().filter(|e| **e == "/mgmt/tm/sys/host-info").count(),
            1
        );
        assert!(endpoints.contains(&"/mgmt/tm/ltm/pool/stats"));
    }

    #[test]
    fn stat_errors_name_the_stat() {
        let props = Properties::from_json(
            r#"{"stats": {"cpu": {"key": "/x", "normalization": [
                {"runFunctions": [{"name": "getAverage", "args": {"keyWithValue": "v"}}]}
            ]}}}"#,
        )
        .unwrap();
        let processor = StatsProcessor::new(&props).unwrap();
        let err = processor.process(&json!({"/x": {"a": {"w": 1}}})).unwrap_err();
        assert!(err.to_string().starts_with("stat 'cpu': getAverage"));
    }

    #[test]
    fn bad_definition_rejected() {
        let props = Properties::from_json(
            r#"{"stats": {"x": {"key": "/x", "normalization": [{"sortKeys": true}]}}}"#,
        )
        .unwrap();
        let err = StatsProcessor::new(&props).unwrap_err();
        assert!(err.to_string().contains("stat 'x'"));
    }
}
