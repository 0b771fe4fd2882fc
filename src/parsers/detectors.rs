//! Heuristic pattern, library and infrastructure detectors.
//!
//! Runs over the same content a parser just processed and annotates the
//! ParseResult with file-scoped records. Matchers are name/structural
//! signatures; confidence is reported, never asserted. No graph nodes are
//! added here.

use regex::Regex;

use crate::{DetectedInfra, DetectedLibrary, DetectedPattern, NodeKind, ParseResult};

struct PatternRule {
    name: &'static str,
    confidence: f64,
    description: &'static str,
    signature: Regex,
}

struct InfraRule {
    kind: &'static str,
    name: &'static str,
    confidence: f64,
    signature: Regex,
}

/// Library categories keyed by import-name prefix (lowercased).
const LIBRARY_CATEGORIES: &[(&str, &str)] = &[
    // Databases
    ("sqlalchemy", "database"),
    ("psycopg2", "database"),
    ("pymongo", "database"),
    ("sqlite3", "database"),
    ("mysql", "database"),
    ("pg", "database"),
    ("mongoose", "database"),
    ("sequelize", "database"),
    ("knex", "database"),
    // Web frameworks
    ("flask", "web_framework"),
    ("django", "web_framework"),
    ("fastapi", "web_framework"),
    ("express", "web_framework"),
    ("react", "web_framework"),
    ("vue", "web_framework"),
    ("next", "web_framework"),
    ("axios", "web_framework"),
    ("requests", "web_framework"),
    // Message queues
    ("celery", "message_queue"),
    ("kafka", "message_queue"),
    ("pika", "message_queue"),
    ("amqplib", "message_queue"),
    ("bull", "message_queue"),
    // Cloud SDKs
    ("boto3", "cloud"),
    ("aws-sdk", "cloud"),
    ("google-cloud", "cloud"),
    ("azure", "cloud"),
    // Caches
    ("redis", "cache"),
    ("memcache", "cache"),
    ("ioredis", "cache"),
    // Testing
    ("pytest", "testing"),
    ("unittest", "testing"),
    ("jest", "testing"),
    ("mocha", "testing"),
];

pub struct Detectors {
    patterns: Vec<PatternRule>,
    infra: Vec<InfraRule>,
    re_mvc: Regex,
}

impl Detectors {
    pub fn new() -> Self {
        let patterns = vec![
            PatternRule {
                name: "singleton",
                confidence: 0.7,
                description: "single shared instance accessor",
                signature: Regex::new(
                    r"(?i)(_instance\b|\bgetInstance\b|\binstance\s*=\s*None|__new__)",
                )
                .unwrap(),
            },
            PatternRule {
                name: "factory",
                confidence: 0.6,
                description: "object construction behind a creator",
                signature: Regex::new(r"(?i)(class\s+\w*Factory\b|\bdef\s+create_\w+|\bcreate[A-Z]\w*\s*\()").unwrap(),
            },
            PatternRule {
                name: "observer",
                confidence: 0.6,
                description: "subscription and notification of listeners",
                signature: Regex::new(r"(?i)(\bsubscribe\b|\bnotify(_all|All)?\b|\bobservers?\b|\baddListener\b)").unwrap(),
            },
            PatternRule {
                name: "builder",
                confidence: 0.6,
                description: "stepwise construction with a final build",
                signature: Regex::new(r"(?i)(class\s+\w*Builder\b|\.build\s*\(\s*\))").unwrap(),
            },
            PatternRule {
                name: "strategy",
                confidence: 0.5,
                description: "interchangeable algorithm objects",
                signature: Regex::new(r"(?i)(class\s+\w*Strategy\b|set_strategy|setStrategy)").unwrap(),
            },
            PatternRule {
                name: "decorator",
                confidence: 0.5,
                description: "behavior wrapped around a component",
                signature: Regex::new(r"(?i)(class\s+\w*Decorator\b|functools\.wraps|@wraps)").unwrap(),
            },
            PatternRule {
                name: "adapter",
                confidence: 0.5,
                description: "interface translation between components",
                signature: Regex::new(r"(?i)class\s+\w*Adapter\b").unwrap(),
            },
        ];

        let infra = vec![
            InfraRule {
                kind: "database",
                name: "sql",
                confidence: 0.7,
                signature: Regex::new(r"(?i)(SELECT\s+.+\s+FROM\s+|INSERT\s+INTO\s+|connection_string|jdbc:)").unwrap(),
            },
            InfraRule {
                kind: "web_framework",
                name: "http_routes",
                confidence: 0.7,
                signature: Regex::new(r#"(?i)(@app\.route|@(get|post|put|delete)\(|app\.(get|post|put|delete)\s*\(\s*["'/])"#).unwrap(),
            },
            InfraRule {
                kind: "message_queue",
                name: "queue",
                confidence: 0.6,
                signature: Regex::new(r"(?i)(amqp://|kafka://|\bpublish\s*\(.+topic|basic_publish)").unwrap(),
            },
            InfraRule {
                kind: "cloud",
                name: "cloud_sdk",
                confidence: 0.6,
                signature: Regex::new(r"(?i)(s3://|arn:aws|boto3\.client|storage\.googleapis)").unwrap(),
            },
            InfraRule {
                kind: "cache",
                name: "cache_client",
                confidence: 0.6,
                signature: Regex::new(r"(?i)(redis://|memcached?://|cache\.(get|set)\s*\()").unwrap(),
            },
        ];

        Detectors {
            patterns,
            infra,
            re_mvc: Regex::new(r"(?i)(controllers?|models?|views?)[/\\]").unwrap(),
        }
    }

    /// Annotate `result` with detected patterns, libraries and infrastructure.
    pub fn run(&self, path: &str, content: &str, result: &mut ParseResult) {
        for rule in &self.patterns {
            if rule.signature.is_match(content) {
                result.patterns.push(DetectedPattern {
                    pattern: rule.name.to_string(),
                    confidence: rule.confidence,
                    description: rule.description.to_string(),
                    file_path: path.to_string(),
                    nodes: matching_node_names(result, rule),
                });
            }
        }

        // MVC is a path-shape signal, not a content signal.
        if self.re_mvc.is_match(path) {
            result.patterns.push(DetectedPattern {
                pattern: "mvc".to_string(),
                confidence: 0.5,
                description: "model/view/controller directory layout".to_string(),
                file_path: path.to_string(),
                nodes: Vec::new(),
            });
        }

        for node in result.nodes.values() {
            if node.kind != NodeKind::Import {
                continue;
            }
            let import_name = node.name.to_lowercase();
            let root = import_name
                .trim_start_matches("./")
                .split(['.', '/'])
                .next()
                .unwrap_or(&import_name);
            if let Some((_, category)) =
                LIBRARY_CATEGORIES.iter().find(|(prefix, _)| root == *prefix)
            {
                result.libraries.push(DetectedLibrary {
                    name: root.to_string(),
                    category: category.to_string(),
                    import_statement: node.summary.clone().unwrap_or_default(),
                    file_path: path.to_string(),
                });
            }
        }

        for rule in &self.infra {
            if rule.signature.is_match(content) {
                result.infrastructure.push(DetectedInfra {
                    kind: rule.kind.to_string(),
                    name: rule.name.to_string(),
                    confidence: rule.confidence,
                    file_path: path.to_string(),
                });
            }
        }
    }
}

impl Default for Detectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Class/function names whose own name matches the pattern rule, for the
/// record's referenced-nodes field.
fn matching_node_names(result: &ParseResult, rule: &PatternRule) -> Vec<String> {
    result
        .nodes
        .values()
        .filter(|n| {
            matches!(n.kind, NodeKind::Class | NodeKind::Function | NodeKind::Method)
                && rule.signature.is_match(&n.name)
        })
        .map(|n| n.name.clone())
        .collect()
}
