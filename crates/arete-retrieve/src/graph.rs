//! Knowledge-graph traversal and enrichment (C9): entity detection over free
//! text, Cypher-like query generation, a pluggable execution contract, and
//! graph-enhanced re-scoring of existing [`SearchResult`]s.
//!
//! Grounded on `graph_traversal_service.py`: `EntityDetector`'s regex
//! patterns and confidences, `CypherQueryGenerator`'s three query shapes plus
//! deep traversal, `GraphTraversalService`'s complexity cap/fallback and TTL
//! cache, and `_calculate_graph_enhanced_score`.

use crate::error::GraphTraversalError;
use crate::model::SearchResult;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Coarse entity category, each with its own detector confidence (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Person,
    Concept,
    Work,
    Place,
}

impl EntityType {
    fn base_confidence(&self) -> f32 {
        match self {
            EntityType::Person => 0.8,
            EntityType::Concept => 0.7,
            EntityType::Work => 0.9,
            EntityType::Place => 0.8,
        }
    }
}

/// Kinds of relationship a graph edge can carry (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    Influenced,
    Taught,
    Wrote,
    Discusses,
    Contradicts,
    Supports,
    MentionedIn,
    PartOf,
    RelatedTo,
    Precedes,
    Follows,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Influenced => "INFLUENCED",
            RelationshipType::Taught => "TAUGHT",
            RelationshipType::Wrote => "WROTE",
            RelationshipType::Discusses => "DISCUSSES",
            RelationshipType::Contradicts => "CONTRADICTS",
            RelationshipType::Supports => "SUPPORTS",
            RelationshipType::MentionedIn => "MENTIONED_IN",
            RelationshipType::PartOf => "PART_OF",
            RelationshipType::RelatedTo => "RELATED_TO",
            RelationshipType::Precedes => "PRECEDES",
            RelationshipType::Follows => "FOLLOWS",
        }
    }
}

/// One detected mention of an entity within a span of text.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMention {
    pub text: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

struct Patterns {
    person: Regex,
    concept: Regex,
    work: Regex,
    place: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        // Two or three capitalized words in a row, e.g. "Marcus Aurelius".
        person: Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2}\b").expect("valid regex"),
        concept: Regex::new(
            r"\b(?i:virtue|justice|wisdom|courage|temperance|knowledge|truth|beauty|eudaimonia|arete|phronesis|sophia|episteme|logos|ethos|pathos)\b",
        )
        .expect("valid regex"),
        work: Regex::new(r"\b(?:the\s+)?[A-Z][a-zA-Z]*(?:'s)?\s+(?:Republic|Ethics|Meditations|Politics|Metaphysics|Dialogues)\b")
            .expect("valid regex"),
        place: Regex::new(r"\b(?:Athens|Rome|Sparta|Alexandria|Macedonia|Corinth|Thebes)\b").expect("valid regex"),
    })
}

/// Detects entity mentions in text via curated regexes (§4.9). Overlapping
/// mentions are resolved by start position, keeping the higher-confidence
/// match.
pub struct EntityDetector;

impl EntityDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, text: &str) -> Vec<EntityMention> {
        let p = patterns();
        let mut mentions = Vec::new();
        for m in p.person.find_iter(text) {
            mentions.push(EntityMention {
                text: m.as_str().to_string(),
                entity_type: EntityType::Person,
                start: m.start(),
                end: m.end(),
                confidence: EntityType::Person.base_confidence(),
            });
        }
        for m in p.concept.find_iter(text) {
            mentions.push(EntityMention {
                text: m.as_str().to_string(),
                entity_type: EntityType::Concept,
                start: m.start(),
                end: m.end(),
                confidence: EntityType::Concept.base_confidence(),
            });
        }
        for m in p.work.find_iter(text) {
            mentions.push(EntityMention {
                text: m.as_str().to_string(),
                entity_type: EntityType::Work,
                start: m.start(),
                end: m.end(),
                confidence: EntityType::Work.base_confidence(),
            });
        }
        for m in p.place.find_iter(text) {
            mentions.push(EntityMention {
                text: m.as_str().to_string(),
                entity_type: EntityType::Place,
                start: m.start(),
                end: m.end(),
                confidence: EntityType::Place.base_confidence(),
            });
        }
        resolve_overlaps(mentions)
    }
}

impl Default for EntityDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort by start position; on overlap, keep the higher-confidence mention.
fn resolve_overlaps(mut mentions: Vec<EntityMention>) -> Vec<EntityMention> {
    mentions.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap()));
    let mut resolved: Vec<EntityMention> = Vec::with_capacity(mentions.len());
    for m in mentions {
        let overlaps = resolved.iter().any(|r| m.start < r.end && r.start < m.end);
        if !overlaps {
            resolved.push(m);
        }
    }
    resolved.sort_by_key(|m| m.start);
    resolved
}

/// A generated graph query: a Cypher-like statement plus the parameters it
/// was built from and its estimated complexity.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    pub statement: String,
    pub entities: Vec<String>,
    pub complexity: u8,
}

/// Hard cap applied after estimation, regardless of shape. Matches
/// `GraphTraversalConfig::default().max_complexity`; kept as a const for call
/// sites that build a query outside a configured service (e.g. tests).
const COMPLEXITY_HARD_CAP: u8 = 10;

/// Tunables for C9, surfaced in the configuration table at §6:
/// `graph.max_path_length`, `graph.max_complexity`, `graph.timeout_seconds`,
/// `graph.cache_ttl`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphTraversalConfig {
    /// Maximum hop count for multi-entity path queries.
    pub max_path_length: u8,
    /// Complexity above which a multi-entity query is downgraded to a
    /// single-entity lookup.
    pub max_complexity_downgrade: u8,
    /// Hard cap applied after estimation and downgrade; queries still above
    /// this are rejected with `GraphTraversalError::ComplexityExceeded`.
    pub max_complexity: u8,
    /// Per-query timeout. Graph I/O is a synchronous blocking call (§5); the
    /// service measures elapsed wall-clock time around it and surfaces
    /// `GraphTraversalError::Timeout` if the store took longer than this.
    pub timeout_seconds: u64,
    /// Cache entry lifetime.
    pub cache_ttl_seconds: u64,
}

impl Default for GraphTraversalConfig {
    fn default() -> Self {
        Self {
            max_path_length: 3,
            max_complexity_downgrade: 8,
            max_complexity: COMPLEXITY_HARD_CAP,
            timeout_seconds: 30,
            cache_ttl_seconds: 300,
        }
    }
}

/// Builds Cypher-like queries from detected entities (§4.9).
pub struct CypherQueryGenerator {
    config: GraphTraversalConfig,
}

impl CypherQueryGenerator {
    pub fn new() -> Self {
        Self::with_config(GraphTraversalConfig::default())
    }

    pub fn with_config(config: GraphTraversalConfig) -> Self {
        Self { config }
    }

    fn estimate_complexity(&self, match_count: u8, relationship_count: u8, variable_length_paths: u8) -> u8 {
        (match_count + relationship_count * 2 + variable_length_paths * 5).min(self.config.max_complexity)
    }

    pub fn entity_lookup(&self, entity: &str) -> CypherQuery {
        CypherQuery {
            statement: format!("MATCH (e {{name: $name}}) WHERE e.name = '{entity}' RETURN e"),
            entities: vec![entity.to_string()],
            complexity: self.estimate_complexity(1, 0, 0),
        }
    }

    pub fn single_entity_relations(&self, entity: &str) -> CypherQuery {
        CypherQuery {
            statement: format!(
                "MATCH (e {{name: '{entity}'}})-[r]-(related) RETURN e, r, related"
            ),
            entities: vec![entity.to_string()],
            complexity: self.estimate_complexity(1, 1, 0),
        }
    }

    pub fn multi_entity_paths(&self, entities: &[String]) -> CypherQuery {
        let complexity = self.estimate_complexity(entities.len() as u8, entities.len().saturating_sub(1) as u8, 1);
        if complexity > self.config.max_complexity_downgrade {
            return entities
                .first()
                .map(|e| self.entity_lookup(e))
                .unwrap_or(CypherQuery {
                    statement: "MATCH (e) RETURN e LIMIT 0".to_string(),
                    entities: Vec::new(),
                    complexity: 0,
                });
        }
        let names: Vec<String> = entities.iter().map(|e| format!("'{e}'")).collect();
        let max_hops = self.config.max_path_length;
        CypherQuery {
            statement: format!(
                "MATCH path = (a)-[*1..{max_hops}]-(b) WHERE a.name IN [{}] AND b.name IN [{}] RETURN path",
                names.join(", "),
                names.join(", ")
            ),
            entities: entities.to_vec(),
            complexity,
        }
    }

    pub fn generate_deep_traversal(&self, entity: &str, depth: u8) -> CypherQuery {
        let depth = depth.min(self.config.max_path_length);
        CypherQuery {
            statement: format!(
                "MATCH path = (e {{name: '{entity}'}})-[*1..{depth}]-(related) RETURN path"
            ),
            entities: vec![entity.to_string()],
            complexity: self.estimate_complexity(1, depth, 1),
        }
    }
}

impl Default for CypherQueryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A single entity/path record returned by executing a [`CypherQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRecord {
    pub entity: String,
    pub relationship: Option<RelationshipType>,
    pub related_entity: Option<String>,
    pub path_length: u32,
    /// Confidence the graph store assigns this record (§3's data model).
    /// Fed into [`graph_enhanced_score`]'s `confidence*0.2` term.
    pub confidence: f32,
    /// Store-side relevance of this record to the originating query, carried
    /// alongside `confidence` but not currently consumed by the scoring
    /// formula (§4.9 defines the base score as the passage's own score).
    pub relevance: f32,
}

/// Outcome of executing a query against the graph store.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphResult {
    pub records: Vec<GraphRecord>,
    pub query: CypherQuery,
}

/// External graph store contract. The core never embeds a database client;
/// callers plug in Neo4j, an in-memory test double, or anything else that can
/// execute a generated statement.
pub trait GraphStore: Send + Sync {
    fn execute(&self, query: &CypherQuery) -> Result<GraphResult, GraphTraversalError>;
}

struct CacheEntry {
    result: GraphResult,
    inserted_at: Instant,
}

const CACHE_SOFT_CAP: usize = 100;
const CACHE_EVICT_COUNT: usize = 20;

/// Drives entity detection, query generation, execution, and score
/// enrichment, with a TTL/size-bounded result cache (§4.9).
pub struct GraphTraversalService {
    store: std::sync::Arc<dyn GraphStore>,
    detector: EntityDetector,
    generator: CypherQueryGenerator,
    cache: RwLock<HashMap<String, CacheEntry>>,
    config: GraphTraversalConfig,
}

impl GraphTraversalService {
    pub fn new(store: std::sync::Arc<dyn GraphStore>) -> Self {
        Self::with_config(store, GraphTraversalConfig::default())
    }

    pub fn with_config(store: std::sync::Arc<dyn GraphStore>, config: GraphTraversalConfig) -> Self {
        Self {
            store,
            detector: EntityDetector::new(),
            generator: CypherQueryGenerator::with_config(config),
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn detect_entities(&self, text: &str) -> Vec<EntityMention> {
        self.detector.detect(text)
    }

    /// Build and run the query shape appropriate to the detected entities:
    /// lookup for one, relations for one-with-context, paths for many.
    /// Queries above the complexity cap fall back to entity lookup for the
    /// first entity.
    pub fn traverse(&self, query_text: &str) -> Result<GraphResult, GraphTraversalError> {
        let mentions = self.detect_entities(query_text);
        let entities: Vec<String> = mentions.into_iter().map(|m| m.text).collect();

        let query = match entities.len() {
            0 => {
                return Err(GraphTraversalError::ComplexityExceeded { complexity: 0, cap: self.config.max_complexity });
            }
            1 => self.generator.single_entity_relations(&entities[0]),
            _ => self.generator.multi_entity_paths(&entities),
        };

        if query.complexity > self.config.max_complexity {
            return Err(GraphTraversalError::ComplexityExceeded {
                complexity: query.complexity,
                cap: self.config.max_complexity,
            });
        }

        self.execute_cached(query)
    }

    fn execute_cached(&self, query: CypherQuery) -> Result<GraphResult, GraphTraversalError> {
        let key = query.statement.clone();
        let ttl = Duration::from_secs(self.config.cache_ttl_seconds);
        {
            let cache = self.cache.read().expect("cache lock poisoned");
            if let Some(entry) = cache.get(&key) {
                if entry.inserted_at.elapsed() < ttl {
                    return Ok(entry.result.clone());
                }
            }
        }

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let started = Instant::now();
        let result = self.store.execute(&query)?;
        if started.elapsed() > timeout {
            return Err(GraphTraversalError::Timeout(started.elapsed()));
        }

        let mut cache = self.cache.write().expect("cache lock poisoned");
        if cache.len() >= CACHE_SOFT_CAP {
            let mut keys_by_age: Vec<(String, Instant)> = cache.iter().map(|(k, v)| (k.clone(), v.inserted_at)).collect();
            keys_by_age.sort_by_key(|(_, t)| *t);
            for (k, _) in keys_by_age.into_iter().take(CACHE_EVICT_COUNT) {
                cache.remove(&k);
            }
        }
        cache.insert(
            key,
            CacheEntry {
                result: result.clone(),
                inserted_at: Instant::now(),
            },
        );
        Ok(result)
    }

    /// Blend a graph traversal result into an existing ranked list (§4.9):
    /// `base + min(relationships*0.1, 0.3) + confidence*0.2 -
    /// max(0, (path_length-1)*0.1)`, clamped to `[0, 1]`. Only passages whose
    /// text mentions the matched entity's name are enriched — `_entity_matches_chunk`
    /// in the graph traversal original gates the same way — so an entity
    /// detected in the query doesn't bleed its bonus onto unrelated passages.
    /// Results touched by more than one entity take the highest-scoring
    /// match. The returned list is re-sorted by final score, descending.
    pub fn enrich(&self, results: &[SearchResult], graph: &GraphResult) -> Vec<SearchResult> {
        let mut by_entity: HashMap<&str, Vec<&GraphRecord>> = HashMap::new();
        for record in &graph.records {
            by_entity.entry(record.entity.as_str()).or_default().push(record);
        }

        let mut enriched: Vec<SearchResult> = results.to_vec();
        for r in enriched.iter_mut() {
            let text_lower = r.passage.text.to_lowercase();
            let mut best: Option<f32> = None;
            for (entity, records) in &by_entity {
                if !text_lower.contains(&entity.to_lowercase()) {
                    continue;
                }
                let relationship_count = records.iter().filter(|rec| rec.relationship.is_some()).count() as f32;
                let avg_confidence =
                    records.iter().map(|rec| rec.confidence).sum::<f32>() / records.len() as f32;
                let avg_path_length =
                    records.iter().map(|rec| rec.path_length as f32).sum::<f32>() / records.len() as f32;
                let enhanced = graph_enhanced_score(r.final_score(), relationship_count, avg_confidence, avg_path_length);
                if best.map(|b| enhanced > b).unwrap_or(true) {
                    best = Some(enhanced);
                    r.metadata.insert("graph_enhanced".to_string(), serde_json::Value::Bool(true));
                    r.metadata.insert(
                        "graph_relationship_count".to_string(),
                        serde_json::Value::from(relationship_count),
                    );
                    r.metadata.insert("graph_matched_entity".to_string(), serde_json::Value::from(*entity));
                }
            }
            if let Some(enhanced) = best {
                r.enhanced_score = Some(enhanced);
            }
        }

        enriched.sort_by(|a, b| {
            b.final_score()
                .partial_cmp(&a.final_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        enriched
    }
}

fn graph_enhanced_score(base: f32, relationship_count: f32, confidence: f32, path_length: f32) -> f32 {
    let relationship_bonus = (relationship_count * 0.1).min(0.3);
    let confidence_bonus = confidence * 0.2;
    let path_penalty = ((path_length - 1.0) * 0.1).max(0.0);
    (base + relationship_bonus + confidence_bonus - path_penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Passage;

    #[test]
    fn detects_concept_entities() {
        let detector = EntityDetector::new();
        let mentions = detector.detect("virtue and justice are central to the dialogue");
        assert!(mentions.iter().any(|m| m.entity_type == EntityType::Concept && m.text == "virtue"));
    }

    #[test]
    fn overlap_resolution_keeps_higher_confidence() {
        let mentions = vec![
            EntityMention { text: "A".into(), entity_type: EntityType::Person, start: 0, end: 5, confidence: 0.8 },
            EntityMention { text: "B".into(), entity_type: EntityType::Work, start: 2, end: 8, confidence: 0.9 },
        ];
        let resolved = resolve_overlaps(mentions);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].text, "B");
    }

    #[test]
    fn multi_entity_paths_downgrade_above_cap() {
        let generator = CypherQueryGenerator::new();
        let entities: Vec<String> = (0..10).map(|i| format!("Entity{i}")).collect();
        let query = generator.multi_entity_paths(&entities);
        assert!(query.complexity <= COMPLEXITY_HARD_CAP);
        assert_eq!(query.entities.len(), 1);
    }

    #[test]
    fn graph_enhanced_score_matches_worked_example() {
        // base 0.5, 2 relationships, confidence 0.9, path_length 1 (no penalty) -> 0.88
        let score = graph_enhanced_score(0.5, 2.0, 0.9, 1.0);
        assert!((score - 0.88).abs() < 1e-6);
    }

    #[test]
    fn enrich_tags_results_as_graph_enhanced() {
        struct NoopStore;
        impl GraphStore for NoopStore {
            fn execute(&self, query: &CypherQuery) -> Result<GraphResult, GraphTraversalError> {
                Ok(GraphResult { records: Vec::new(), query: query.clone() })
            }
        }
        let service = GraphTraversalService::new(std::sync::Arc::new(NoopStore));
        let result = SearchResult::new(Passage::new(1, 0, "Socrates taught Plato in Athens"), 0.5, "query");
        let graph = GraphResult {
            records: vec![GraphRecord {
                entity: "Socrates".into(),
                relationship: Some(RelationshipType::Taught),
                related_entity: Some("Plato".into()),
                path_length: 1,
                confidence: 0.9,
                relevance: 0.7,
            }],
            query: service.generator.entity_lookup("Socrates"),
        };
        let enriched = service.enrich(&[result], &graph);
        assert_eq!(enriched[0].metadata.get("graph_enhanced"), Some(&serde_json::Value::Bool(true)));
        assert!((enriched[0].final_score() - 0.88).abs() < 1e-6);
    }

    #[test]
    fn enrich_leaves_non_matching_passages_untouched() {
        struct NoopStore;
        impl GraphStore for NoopStore {
            fn execute(&self, query: &CypherQuery) -> Result<GraphResult, GraphTraversalError> {
                Ok(GraphResult { records: Vec::new(), query: query.clone() })
            }
        }
        let service = GraphTraversalService::new(std::sync::Arc::new(NoopStore));
        let result = SearchResult::new(Passage::new(1, 0, "the weather today is mild"), 0.5, "query");
        let graph = GraphResult {
            records: vec![GraphRecord {
                entity: "Socrates".into(),
                relationship: Some(RelationshipType::Taught),
                related_entity: Some("Plato".into()),
                path_length: 1,
                confidence: 0.9,
                relevance: 0.7,
            }],
            query: service.generator.entity_lookup("Socrates"),
        };
        let enriched = service.enrich(&[result], &graph);
        assert_eq!(enriched[0].metadata.get("graph_enhanced"), None);
        assert_eq!(enriched[0].enhanced_score, None);
        assert_eq!(enriched[0].final_score(), 0.5);
    }
}
