//! Event configuration model and registry
//!
//! One [`EventConfig`] per event type lists the tables an event fans out
//! into. The registry is built once at startup, validated, and then shared
//! read-only (`Arc<EventRegistry>`) by every ingestion.
//!
//! Only one configuration shape is accepted. Unknown keys are rejected so
//! stale files written for older layouts fail loudly at load time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use cie_common::CieError;

/// Role of a table in the event's row hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Establishes the parent identifier
    Main,
    /// Mapped like a main table, references the parent
    Detail,
    /// Fanned out from address rules, one row per resolved node
    Address,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Main => write!(f, "main"),
            TableKind::Detail => write!(f, "detail"),
            TableKind::Address => write!(f, "address"),
        }
    }
}

/// How to turn one JSON fragment (or each element of an array) into an address row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddressRule {
    /// Type tag written to every produced row (HOME, BILLING, ...)
    #[serde(rename = "type")]
    pub address_type: String,

    /// Path to the address node or array of nodes
    pub root_path: String,

    /// Column -> path, relative to the resolved node
    pub field_mapping: BTreeMap<String, String>,
}

/// One table an event writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableDefinition {
    /// Configuration-level identifier, unique within the registry
    pub logical_key: String,

    /// Physical table name; defaults to the logical key
    #[serde(default)]
    pub table: Option<String>,

    pub order: i32,

    pub kind: TableKind,

    /// Column that receives the parent identifier on child rows
    #[serde(default)]
    pub parent_id_field: Option<String>,

    #[serde(default)]
    pub auto_generate_id: bool,

    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,

    #[serde(default)]
    pub mandatory_columns: Vec<String>,

    /// Inline address rules; when empty the event-level rule set is used
    #[serde(default)]
    pub address_rules: Vec<AddressRule>,
}

impl TableDefinition {
    pub fn physical_table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.logical_key)
    }
}

/// All tables written for one event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventConfig {
    pub event_name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Sorted by `order` once registered
    pub tables: Vec<TableDefinition>,
}

/// Event-level address rules, used by address tables without inline rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddressRuleSet {
    pub event_name: String,
    pub addresses: Vec<AddressRule>,
}

/// Static logical -> physical table lookup
#[derive(Debug, Clone, Default)]
pub struct TableDirectory {
    tables: HashMap<String, String>,
}

impl TableDirectory {
    /// Physical name for a logical key; unknown keys name their table directly
    pub fn resolve<'a>(&'a self, logical_key: &'a str) -> &'a str {
        self.tables.get(logical_key).map(String::as_str).unwrap_or(logical_key)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Immutable registry of event configurations
#[derive(Debug, Default)]
pub struct EventRegistry {
    events: HashMap<String, EventConfig>,
    address_rules: HashMap<String, Vec<AddressRule>>,
    directory: Arc<TableDirectory>,
}

impl EventRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn event(&self, event_name: &str) -> Option<&EventConfig> {
        self.events.get(event_name)
    }

    pub fn events(&self) -> impl Iterator<Item = &EventConfig> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Address rules for an address table: inline rules first, then the
    /// event-level set
    pub fn address_rules_for<'a>(
        &'a self,
        event_name: &str,
        table: &'a TableDefinition,
    ) -> &'a [AddressRule] {
        if !table.address_rules.is_empty() {
            return &table.address_rules;
        }
        self.address_rules
            .get(event_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn table_directory(&self) -> Arc<TableDirectory> {
        Arc::clone(&self.directory)
    }
}

/// Collects and validates configuration before freezing it into an [`EventRegistry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    events: Vec<EventConfig>,
    address_rules: Vec<AddressRuleSet>,
}

impl RegistryBuilder {
    pub fn event(mut self, config: EventConfig) -> Self {
        self.events.push(config);
        self
    }

    pub fn address_rules(mut self, rules: AddressRuleSet) -> Self {
        self.address_rules.push(rules);
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    ///
    /// Rejects duplicate event names, duplicate `order` values within one
    /// event, a logical key mapped to two physical tables, and address tables
    /// with no rule source.
    pub fn build(self) -> Result<EventRegistry, CieError> {
        let mut address_rules: HashMap<String, Vec<AddressRule>> = HashMap::new();
        for set in self.address_rules {
            if address_rules.insert(set.event_name.clone(), set.addresses).is_some() {
                return Err(CieError::config(format!(
                    "address rules for event '{}' defined more than once",
                    set.event_name
                )));
            }
        }

        let mut events = HashMap::new();
        let mut directory: HashMap<String, String> = HashMap::new();

        for mut config in self.events {
            if config.event_name.trim().is_empty() {
                return Err(CieError::config("event configuration without an eventName"));
            }

            config.tables.sort_by_key(|t| t.order);

            let mut orders = HashSet::new();
            for table in &config.tables {
                if !orders.insert(table.order) {
                    return Err(CieError::config(format!(
                        "event '{}' has more than one table with order {}",
                        config.event_name, table.order
                    )));
                }

                let physical = table.physical_table().to_string();
                match directory.get(&table.logical_key) {
                    Some(existing) if *existing != physical => {
                        return Err(CieError::config(format!(
                            "logical table '{}' maps to both '{}' and '{}'",
                            table.logical_key, existing, physical
                        )));
                    },
                    Some(_) => {},
                    None => {
                        directory.insert(table.logical_key.clone(), physical);
                    },
                }

                if table.kind == TableKind::Address
                    && table.address_rules.is_empty()
                    && !address_rules.contains_key(&config.event_name)
                {
                    return Err(CieError::config(format!(
                        "address table '{}' of event '{}' has no address rules",
                        table.logical_key, config.event_name
                    )));
                }
            }

            let name = config.event_name.clone();
            if events.insert(name.clone(), config).is_some() {
                return Err(CieError::config(format!("event '{}' configured more than once", name)));
            }
        }

        Ok(EventRegistry {
            events,
            address_rules,
            directory: Arc::new(TableDirectory { tables: directory }),
        })
    }
}
