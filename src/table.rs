use crate::config::{Config, ConfigError, PreflightEntry};
use crate::resolver::{Resolution, UtilityResolver};
use crate::style::{Declaration, Rule, StyleSheet};
use indexmap::IndexMap;
use serde::Deserialize;
use xxhash_rust::xxh3::xxh3_64;

const BUILTIN_UTILITIES: &str = include_str!("utilities.toml");
const BUILTIN_PREFLIGHT: &str = include_str!("preflight.toml");

#[derive(Debug, Deserialize)]
struct UtilityTable {
    #[serde(default)]
    utilities: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PreflightTable {
    #[serde(default)]
    preflight: Vec<PreflightEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PreflightRule {
    selector: String,
    tags: Vec<String>,
    declarations: Vec<Declaration>,
    global: bool,
}

impl From<&PreflightEntry> for PreflightRule {
    fn from(entry: &PreflightEntry) -> Self {
        Self {
            tags: selector_tags(&entry.selector),
            selector: entry.selector.clone(),
            declarations: Declaration::parse_list(&entry.declarations),
            global: entry.global,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableResolver {
    utilities: IndexMap<String, Vec<Declaration>>,
    preflight: Vec<PreflightRule>,
}

impl TableResolver {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        let utilities: UtilityTable =
            toml::from_str(BUILTIN_UTILITIES).map_err(|source| ConfigError::Builtin {
                table: "utilities",
                source,
            })?;
        let preflight: PreflightTable =
            toml::from_str(BUILTIN_PREFLIGHT).map_err(|source| ConfigError::Builtin {
                table: "preflight",
                source,
            })?;
        let mut resolver = Self::empty();
        resolver.extend_utilities(&utilities.utilities);
        resolver.extend_preflight(&preflight.preflight);
        Ok(resolver)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut resolver = Self::builtin()?;
        resolver.extend_utilities(&config.utilities);
        resolver.extend_preflight(&config.preflight);
        Ok(resolver)
    }

    pub fn extend_utilities(&mut self, utilities: &IndexMap<String, String>) {
        for (token, declarations) in utilities {
            self.utilities
                .insert(token.clone(), Declaration::parse_list(declarations));
        }
    }

    pub fn extend_preflight(&mut self, entries: &[PreflightEntry]) {
        self.preflight.extend(entries.iter().map(PreflightRule::from));
    }

    pub fn utility_count(&self) -> usize {
        self.utilities.len()
    }

    fn lookup(&self, token: &str) -> Option<(u32, &[Declaration])> {
        self.utilities
            .get_full(token)
            .map(|(idx, _, declarations)| (idx as u32, declarations.as_slice()))
    }

    fn partition<'c>(&self, classes: &'c str) -> (Vec<&'c str>, Vec<String>) {
        let mut resolved: Vec<&str> = Vec::new();
        let mut ignored = Vec::new();
        for token in classes.split_whitespace() {
            if self.lookup(token).is_some() {
                if !resolved.contains(&token) {
                    resolved.push(token);
                }
            } else {
                ignored.push(token.to_string());
            }
        }
        (resolved, ignored)
    }
}

impl UtilityResolver for TableResolver {
    fn compile(&self, classes: &str, prefix: &str) -> Resolution {
        let (resolved, ignored) = self.partition(classes);
        if resolved.is_empty() {
            return Resolution {
                ignored,
                ..Resolution::default()
            };
        }

        let class_name = format!("{}{}", prefix, short_hash(&resolved.join(" ")));
        let mut declarations: Vec<Declaration> = Vec::new();
        let mut order = u32::MAX;
        for (idx, token_declarations) in resolved.iter().filter_map(|token| self.lookup(token)) {
            order = order.min(idx);
            for declaration in token_declarations {
                declarations.retain(|current| current.property != declaration.property);
                declarations.push(declaration.clone());
            }
        }

        let rule = Rule::new(format!(".{}", escape_selector(&class_name)), declarations)
            .with_order(order);
        Resolution {
            emitted_token: Some(class_name),
            ignored,
            style_sheet: StyleSheet::from_rules(vec![rule]),
        }
    }

    fn interpret(&self, classes: &str) -> Resolution {
        let (resolved, ignored) = self.partition(classes);
        let rules = resolved
            .iter()
            .filter_map(|token| {
                let (idx, declarations) = self.lookup(token)?;
                Some(
                    Rule::new(format!(".{}", escape_selector(token)), declarations.to_vec())
                        .with_order(idx),
                )
            })
            .collect();
        Resolution {
            emitted_token: None,
            ignored,
            style_sheet: StyleSheet::from_rules(rules),
        }
    }

    fn preflight(&self, tags: &[String], include_global: bool) -> StyleSheet {
        let rules = self
            .preflight
            .iter()
            .enumerate()
            .filter(|(_, rule)| {
                if rule.global {
                    include_global
                } else {
                    rule.tags.iter().any(|tag| tags.contains(tag))
                }
            })
            .map(|(idx, rule)| {
                Rule::new(rule.selector.clone(), rule.declarations.clone()).with_order(idx as u32)
            })
            .collect();
        StyleSheet::from_rules(rules)
    }
}

fn short_hash(text: &str) -> String {
    format!("{:08x}", xxh3_64(text.as_bytes()) & 0xffff_ffff)
}

fn selector_tags(selector: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for part in selector.split(',') {
        let name = part
            .trim()
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
            .collect::<String>()
            .to_ascii_lowercase();
        if !name.is_empty() && !tags.contains(&name) {
            tags.push(name);
        }
    }
    tags
}

fn escape_selector(class: &str) -> String {
    let mut escaped = String::with_capacity(class.len() * 2);
    for (idx, ch) in class.chars().enumerate() {
        match ch {
            '\\' | ':' | '/' | '[' | ']' | '(' | ')' | '&' | '>' | '+' | ',' | '%' | '=' | '!'
            | '*' | '@' | '#' | '\'' | '"' | '.' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '0'..='9' if idx == 0 => {
                escaped.push_str(&format!("\\3{} ", ch));
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{TableResolver, escape_selector, selector_tags};
    use crate::config::{Config, PreflightEntry};
    use crate::resolver::UtilityResolver;
    use crate::style::DeferredScope;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn builtin() -> TableResolver {
        TableResolver::builtin().expect("builtin tables parse")
    }

    #[test]
    fn builtin_tables_load() {
        let resolver = builtin();
        assert!(resolver.utility_count() > 50);
        assert!(!resolver.preflight(&[], true).is_empty());
    }

    #[test]
    fn interprets_known_tokens_and_ignores_the_rest() {
        let resolution = builtin().interpret("flex w-1/2 nope flex");
        assert_eq!(resolution.ignored, vec!["nope".to_string()]);
        assert_eq!(resolution.emitted_token, None);
        let selectors = resolution
            .style_sheet
            .rules()
            .iter()
            .map(|rule| rule.selector.as_str())
            .collect::<Vec<_>>();
        assert_eq!(selectors, vec![".flex", ".w-1\\/2"]);
    }

    #[test]
    fn compiles_into_one_stable_class() {
        let resolver = builtin();
        let first = resolver.compile("p-4 flex nope", "windi-");
        let second = resolver.compile("p-4   flex", "windi-");

        let class_name = first.emitted_token.clone().expect("emitted token");
        assert!(class_name.starts_with("windi-"));
        assert_eq!(class_name.len(), "windi-".len() + 8);
        assert_eq!(second.emitted_token, Some(class_name.clone()));
        assert_eq!(first.ignored, vec!["nope".to_string()]);

        let css = first.style_sheet.build(DeferredScope::Local);
        assert!(css.starts_with(&format!(".{} {{", class_name)));
        assert!(css.contains("padding: 1rem;"));
        assert!(css.contains("display: flex;"));
    }

    #[test]
    fn compile_without_known_tokens_emits_nothing() {
        let resolution = builtin().compile("nope other", "windi-");
        assert_eq!(resolution.emitted_token, None);
        assert!(resolution.style_sheet.is_empty());
        assert_eq!(resolution.replacement_text(), "nope other");
    }

    #[test]
    fn later_tokens_override_shared_properties() {
        let css = builtin()
            .compile("block hidden", "x-")
            .style_sheet
            .build(DeferredScope::Local);
        assert!(css.contains("display: none;"));
        assert!(!css.contains("display: block;"));
    }

    #[test]
    fn preflight_filters_by_tag_and_global_flag() {
        let resolver = builtin();
        let tagged = resolver.preflight(&["button".to_string()], false);
        assert!(tagged.rules().iter().all(|rule| rule.selector.contains("button")));
        assert!(!tagged.is_empty());

        let with_global = resolver.preflight(&[], true);
        assert_eq!(with_global.rules()[0].selector, "*, ::before, ::after");
        assert!(resolver.preflight(&[], false).is_empty());
    }

    #[test]
    fn config_entries_layer_over_builtin_tables() {
        let mut utilities = IndexMap::new();
        utilities.insert("flex".to_string(), "display: inline-flex".to_string());
        utilities.insert("brand".to_string(), "color: #3b82f6".to_string());
        let config = Config {
            utilities,
            preflight: vec![PreflightEntry {
                selector: "dialog".to_string(),
                declarations: "padding: 0".to_string(),
                global: false,
            }],
            ..Config::default()
        };
        let resolver = TableResolver::from_config(&config).expect("tables");

        let css = resolver
            .interpret("flex brand")
            .style_sheet
            .build(DeferredScope::Local);
        assert!(css.contains("display: inline-flex;"));
        assert!(css.contains("color: #3b82f6;"));
        assert_eq!(resolver.preflight(&["dialog".to_string()], false).len(), 1);
    }

    #[test]
    fn derives_tags_from_selectors() {
        assert_eq!(
            selector_tags("input::placeholder, textarea::placeholder, abbr[title]"),
            vec!["input", "textarea", "abbr"]
        );
        assert!(selector_tags("*, ::before").is_empty());
    }

    #[test]
    fn escapes_selector_characters() {
        assert_eq!(escape_selector("md:w-1/2"), "md\\:w-1\\/2");
        assert_eq!(escape_selector("2xl"), "\\32 xl");
    }
}
