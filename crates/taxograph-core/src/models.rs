//! Data model shared by every taxograph crate.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Concept identifier (e.g. `"water"`, `"drought"`).
pub type ConceptId = String;

// =============================================================================
// CONCEPTS
// =============================================================================

/// Category a concept belongs to. A concept may carry several kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConceptKind {
    Topic,
    DataType,
    TimePeriod,
    Frequency,
    Geography,
}

impl ConceptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topic => "TOPIC",
            Self::DataType => "DATA_TYPE",
            Self::TimePeriod => "TIME_PERIOD",
            Self::Frequency => "FREQUENCY",
            Self::Geography => "GEOGRAPHY",
        }
    }
}

impl std::fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConceptKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TOPIC" => Ok(Self::Topic),
            "DATA_TYPE" => Ok(Self::DataType),
            "TIME_PERIOD" => Ok(Self::TimePeriod),
            "FREQUENCY" => Ok(Self::Frequency),
            "GEOGRAPHY" => Ok(Self::Geography),
            _ => Err(format!("Invalid concept kind: {}", s)),
        }
    }
}

/// Relation carried by a hierarchy edge (specific → general).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyRelation {
    PartOf,
    IsA,
    QualityOf,
}

impl HierarchyRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PartOf => "PART_OF",
            Self::IsA => "IS_A",
            Self::QualityOf => "QUALITY_OF",
        }
    }
}

impl std::str::FromStr for HierarchyRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PART_OF" => Ok(Self::PartOf),
            "IS_A" => Ok(Self::IsA),
            "QUALITY_OF" => Ok(Self::QualityOf),
            _ => Err(format!("Invalid hierarchy relation: {}", s)),
        }
    }
}

/// Direction of a hierarchy walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalDirection {
    /// Towards more general concepts (ancestors).
    Broader,
    /// Towards more specific concepts (descendants).
    Narrower,
}

/// A taxonomy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default, rename = "labels")]
    pub kinds: Vec<ConceptKind>,
}

impl Concept {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            synonyms: Vec::new(),
            kinds: Vec::new(),
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ConceptKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn has_kind(&self, kind: ConceptKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// True when any term is a case-insensitive substring of the label or
    /// of one of the synonyms.
    pub fn matches_any_term(&self, terms: &[String]) -> bool {
        let label = self.label.to_lowercase();
        let synonyms: Vec<String> = self.synonyms.iter().map(|s| s.to_lowercase()).collect();
        terms.iter().map(|t| t.to_lowercase()).any(|term| {
            label.contains(&term) || synonyms.iter().any(|synonym| synonym.contains(&term))
        })
    }
}

/// A concept reached by a hierarchy walk, with the fewest hops it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachableConcept {
    pub concept_id: ConceptId,
    pub hops: u32,
}

/// Filter for concept listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptFilter {
    /// Keep concepts carrying at least one of these kinds (empty = no filter).
    pub includes: Vec<ConceptKind>,
    /// Keep concepts whose label or synonyms contain one of these terms
    /// (empty = no filter).
    pub search: Vec<String>,
}

impl ConceptFilter {
    /// Build a filter from comma-separated request parameters.
    ///
    /// Only the listable kinds are honoured in `includes`; anything else is
    /// dropped rather than rejected.
    pub fn from_params(includes: Option<&str>, search: Option<&str>) -> Self {
        let includes = includes
            .map(|raw| {
                let mut kinds: Vec<ConceptKind> = raw
                    .split(',')
                    .map(|k| k.trim().to_uppercase())
                    .filter(|k| defaults::LISTABLE_KINDS.contains(&k.as_str()))
                    .filter_map(|k| k.parse().ok())
                    .collect();
                kinds.sort();
                kinds.dedup();
                kinds
            })
            .unwrap_or_default();
        let search = search
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self { includes, search }
    }

    pub fn matches(&self, concept: &Concept) -> bool {
        let kind_ok =
            self.includes.is_empty() || self.includes.iter().any(|k| concept.has_kind(*k));
        let search_ok = self.search.is_empty() || concept.matches_any_term(&self.search);
        kind_ok && search_ok
    }
}

/// Concept listing row: the concept plus the datasets tagged with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptUsage {
    #[serde(flatten)]
    pub concept: Concept,
    pub number_of_datasets_tagged: i64,
    pub datasets: Vec<String>,
}

/// A concept tagged to a specific dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConcept {
    pub dataset: String,
    #[serde(flatten)]
    pub concept: Concept,
}

// =============================================================================
// RESOURCES
// =============================================================================

/// Kind of catalogued resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Dataset,
    Widget,
    Layer,
    Metadata,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "DATASET",
            Self::Widget => "WIDGET",
            Self::Layer => "LAYER",
            Self::Metadata => "METADATA",
        }
    }

    /// Whether a resource of this type may belong to `parent`.
    pub fn can_belong_to(&self, parent: ResourceType) -> bool {
        match self {
            Self::Dataset => false,
            Self::Widget | Self::Layer => parent == Self::Dataset,
            Self::Metadata => matches!(parent, Self::Dataset | Self::Widget | Self::Layer),
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DATASET" => Ok(Self::Dataset),
            "WIDGET" => Ok(Self::Widget),
            "LAYER" => Ok(Self::Layer),
            "METADATA" => Ok(Self::Metadata),
            _ => Err(format!("Invalid resource type: {}", s)),
        }
    }
}

/// Typed resource reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceType,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceType, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn dataset(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Dataset, id)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// One tag edge, reduced to the fields similarity counting needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagPair {
    pub resource_id: String,
    pub concept_id: ConceptId,
}

/// Which tenants a tag operation touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagScope {
    Application(String),
    /// Every tenant. Only ever chosen explicitly by the caller.
    AllApplications,
}

// =============================================================================
// RANKING
// =============================================================================

/// A resource id with an aggregate count (views, favourites).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCount {
    pub id: String,
    pub count: i64,
}

impl MetricCount {
    pub fn new(id: impl Into<String>, count: i64) -> Self {
        Self {
            id: id.into(),
            count,
        }
    }
}

/// View-ranked dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetViews {
    pub dataset: String,
    pub views: i64,
}

/// Similarity result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarDataset {
    pub dataset: String,
    pub concepts: Vec<ConceptId>,
    pub number_of_occurrences: usize,
}

/// Secondary metric used to order datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMetric {
    MostViewed,
    MostFavorited,
}

impl SortMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MostViewed => "most-viewed",
            Self::MostFavorited => "most-favorited",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Parsed `sort` request parameter: `most-viewed`, `-most-favorited`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub metric: SortMetric,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn descending(metric: SortMetric) -> Self {
        Self {
            metric,
            direction: SortDirection::Descending,
        }
    }
}

impl std::fmt::Display for SortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.direction == SortDirection::Descending {
            f.write_str("-")?;
        }
        f.write_str(self.metric.as_str())
    }
}

impl std::str::FromStr for SortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (direction, key) = match s.strip_prefix('-') {
            Some(rest) => (SortDirection::Descending, rest),
            None => (SortDirection::Ascending, s),
        };
        let metric = match key {
            "most-viewed" => SortMetric::MostViewed,
            "most-favorited" => SortMetric::MostFavorited,
            _ => return Err(format!("Invalid sort key: {}", s)),
        };
        Ok(Self { metric, direction })
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// Entry returned by the resource catalog. Only `id` is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl DirectoryEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_kind_roundtrip_case_insensitive() {
        assert_eq!("topic".parse::<ConceptKind>().unwrap(), ConceptKind::Topic);
        assert_eq!(
            "Data_Type".parse::<ConceptKind>().unwrap(),
            ConceptKind::DataType
        );
        assert!("colour".parse::<ConceptKind>().is_err());
        assert_eq!(ConceptKind::TimePeriod.to_string(), "TIME_PERIOD");
    }

    #[test]
    fn test_resource_type_parse() {
        assert_eq!(
            "dataset".parse::<ResourceType>().unwrap(),
            ResourceType::Dataset
        );
        assert_eq!(
            "METADATA".parse::<ResourceType>().unwrap(),
            ResourceType::Metadata
        );
        assert!("user".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_resource_parentage() {
        assert!(ResourceType::Widget.can_belong_to(ResourceType::Dataset));
        assert!(ResourceType::Metadata.can_belong_to(ResourceType::Layer));
        assert!(!ResourceType::Layer.can_belong_to(ResourceType::Widget));
        assert!(!ResourceType::Dataset.can_belong_to(ResourceType::Dataset));
    }

    #[test]
    fn test_sort_spec_leading_dash_flips_to_descending() {
        let spec: SortSpec = "-most-viewed".parse().unwrap();
        assert_eq!(spec.metric, SortMetric::MostViewed);
        assert_eq!(spec.direction, SortDirection::Descending);

        let spec: SortSpec = "most-favorited".parse().unwrap();
        assert_eq!(spec.metric, SortMetric::MostFavorited);
        assert_eq!(spec.direction, SortDirection::Ascending);
        assert_eq!(spec.to_string(), "most-favorited");
    }

    #[test]
    fn test_sort_spec_rejects_unknown_metric() {
        assert!("-most-shared".parse::<SortSpec>().is_err());
        assert!("".parse::<SortSpec>().is_err());
    }

    #[test]
    fn test_concept_term_matching_uses_label_and_synonyms() {
        let concept = Concept::new("water", "Water").with_synonyms(["H2O", "aqua"]);
        assert!(concept.matches_any_term(&["wat".to_string()]));
        assert!(concept.matches_any_term(&["h2o".to_string()]));
        assert!(!concept.matches_any_term(&["fire".to_string()]));
    }

    #[test]
    fn test_concept_filter_drops_unlisted_kinds() {
        let filter = ConceptFilter::from_params(Some("topic, geography,bogus"), None);
        assert_eq!(filter.includes, vec![ConceptKind::Topic]);
        assert!(filter.search.is_empty());
    }

    #[test]
    fn test_concept_filter_matches_kind_and_search() {
        let filter = ConceptFilter::from_params(Some("TOPIC"), Some("rain"));
        let rain = Concept::new("rainfall", "Rainfall").with_kinds([ConceptKind::Topic]);
        let rain_period =
            Concept::new("rainy_season", "Rainy season").with_kinds([ConceptKind::TimePeriod]);
        let drought = Concept::new("drought", "Drought").with_kinds([ConceptKind::Topic]);

        assert!(filter.matches(&rain));
        assert!(!filter.matches(&rain_period));
        assert!(!filter.matches(&drought));
        assert!(ConceptFilter::default().matches(&rain_period));
    }

    #[test]
    fn test_concept_serializes_kinds_as_labels() {
        let concept = Concept::new("water", "Water").with_kinds([ConceptKind::Topic]);
        let json = serde_json::to_value(&concept).unwrap();
        assert_eq!(json["labels"], serde_json::json!(["TOPIC"]));
    }

    #[test]
    fn test_directory_entry_keeps_extra_fields() {
        let entry: DirectoryEntry =
            serde_json::from_str(r#"{"id":"d1","name":"Rivers","published":true}"#).unwrap();
        assert_eq!(entry.id, "d1");
        assert_eq!(entry.attributes["name"], "Rivers");
    }
}
