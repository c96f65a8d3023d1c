//! Typed stage payloads
//!
//! Every model-produced object has a serde type and a matching [`Shape`].
//! Ranges:
//! - plan priority and analysis importance: 1..=5
//! - gap severity and follow-up priority: 2..=10
//! - confidence: 0..=1
//! - data plan: 1-2 analyses, 1-4 queries

use delve_generation::StructuredOutput;
use delve_schema::Shape;
use serde::{Deserialize, Serialize};

fn finding_shape() -> Shape {
    Shape::object([
        ("insight", Shape::string()),
        ("evidence", Shape::array(Shape::string())),
        ("confidence", Shape::number().range(0.0, 1.0)),
    ])
}

fn analysis_shape() -> Shape {
    Shape::object([
        ("type", Shape::string()),
        ("description", Shape::string()),
        ("importance", Shape::integer().range(1.0, 5.0)),
    ])
}

/// Analysis requested by a plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequiredAnalysis {
    /// Analysis kind, e.g. "comparative"
    #[serde(rename = "type")]
    pub kind: String,
    /// What to analyze
    pub description: String,
    /// Weight 1-5
    pub importance: u8,
}

/// Web search query in a research plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text
    pub query: String,
    /// Why this query
    pub rationale: String,
    /// Always "web"
    pub source: String,
    /// Weight 1-5
    pub priority: u8,
}

/// Research plan produced by the plan stage
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// Searches to run
    pub search_queries: Vec<SearchQuery>,
    /// Analyses to perform over the results
    pub required_analyses: Vec<RequiredAnalysis>,
}

impl ResearchPlan {
    /// Single-search plan over the literal topic
    #[must_use]
    pub fn fallback(topic: &str) -> Self {
        Self {
            search_queries: vec![SearchQuery {
                query: topic.to_string(),
                rationale: "Initial broad search to understand the topic".to_string(),
                source: "web".to_string(),
                priority: 3,
            }],
            required_analyses: vec![RequiredAnalysis {
                kind: "overview".to_string(),
                description: "General analysis of the main aspects of the topic".to_string(),
                importance: 4,
            }],
        }
    }
}

impl StructuredOutput for ResearchPlan {
    fn shape() -> Shape {
        Shape::object([
            (
                "search_queries",
                Shape::array(Shape::object([
                    ("query", Shape::string()),
                    ("rationale", Shape::string()),
                    ("source", Shape::literal("web")),
                    ("priority", Shape::integer().range(1.0, 5.0)),
                ])),
            ),
            ("required_analyses", Shape::array(analysis_shape())),
        ])
    }

    fn schema_name() -> &'static str {
        "research_plan"
    }
}

/// One insight with its evidence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Finding {
    /// The insight
    pub insight: String,
    /// Supporting evidence
    pub evidence: Vec<String>,
    /// Confidence 0-1
    pub confidence: f64,
}

/// Result of one analysis call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Findings
    pub findings: Vec<Finding>,
    /// Implications
    pub implications: Vec<String>,
    /// Limitations
    pub limitations: Vec<String>,
}

impl StructuredOutput for AnalysisResult {
    fn shape() -> Shape {
        Shape::object([
            ("findings", Shape::array(finding_shape())),
            ("implications", Shape::array(Shape::string())),
            ("limitations", Shape::array(Shape::string())),
        ])
    }

    fn schema_name() -> &'static str {
        "analysis"
    }
}

/// Research limitation from gap analysis
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Limitation {
    /// Limitation kind
    #[serde(rename = "type")]
    pub kind: String,
    /// Description
    pub description: String,
    /// Severity 2-10
    pub severity: u8,
    /// Ways to address it
    pub potential_solutions: Vec<String>,
}

/// Area needing more research
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KnowledgeGap {
    /// Gap topic
    pub topic: String,
    /// Why it is a gap
    pub reason: String,
    /// Searches that could fill it
    pub additional_queries: Vec<String>,
}

/// Recommended next action
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Followup {
    /// Action
    pub action: String,
    /// Why
    pub rationale: String,
    /// Priority 2-10
    pub priority: u8,
}

/// Closing gap analysis of a research run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GapAnalysis {
    /// Limitations
    pub limitations: Vec<Limitation>,
    /// Knowledge gaps
    pub knowledge_gaps: Vec<KnowledgeGap>,
    /// Recommended follow-up
    pub recommended_followup: Vec<Followup>,
}

impl GapAnalysis {
    /// Generic gap analysis used when generation degrades
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            limitations: vec![Limitation {
                kind: "data completeness".to_string(),
                description: "The research has some inherent limitations in scope and coverage"
                    .to_string(),
                severity: 5,
                potential_solutions: vec![
                    "Additional research".to_string(),
                    "Broader source selection".to_string(),
                ],
            }],
            knowledge_gaps: vec![KnowledgeGap {
                topic: "Additional research areas".to_string(),
                reason: "Technical limitations prevented comprehensive gap analysis".to_string(),
                additional_queries: vec!["Further targeted research recommended".to_string()],
            }],
            recommended_followup: vec![Followup {
                action: "Consider follow-up research".to_string(),
                rationale: "To address potential knowledge gaps".to_string(),
                priority: 5,
            }],
        }
    }

    /// Limitations rendered as findings; lower severity gives higher confidence
    #[must_use]
    pub fn limitation_findings(&self) -> Vec<Finding> {
        self.limitations
            .iter()
            .map(|l| Finding {
                insight: l.description.clone(),
                evidence: l.potential_solutions.clone(),
                confidence: ((6.0 - f64::from(l.severity)) / 5.0).clamp(0.0, 1.0),
            })
            .collect()
    }
}

impl StructuredOutput for GapAnalysis {
    fn shape() -> Shape {
        Shape::object([
            (
                "limitations",
                Shape::array(Shape::object([
                    ("type", Shape::string()),
                    ("description", Shape::string()),
                    ("severity", Shape::integer().range(2.0, 10.0)),
                    ("potential_solutions", Shape::array(Shape::string())),
                ])),
            ),
            (
                "knowledge_gaps",
                Shape::array(Shape::object([
                    ("topic", Shape::string()),
                    ("reason", Shape::string()),
                    ("additional_queries", Shape::array(Shape::string())),
                ])),
            ),
            (
                "recommended_followup",
                Shape::array(Shape::object([
                    ("action", Shape::string()),
                    ("rationale", Shape::string()),
                    ("priority", Shape::integer().range(2.0, 10.0)),
                ])),
            ),
        ])
    }

    fn schema_name() -> &'static str {
        "gap_analysis"
    }
}

/// Synthesized conclusion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyFinding {
    /// Conclusion
    pub finding: String,
    /// Evidence
    pub supporting_evidence: Vec<String>,
    /// Confidence 0-1
    pub confidence: f64,
}

/// Final synthesis after gap filling
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Synthesis {
    /// Key findings
    pub key_findings: Vec<KeyFinding>,
    /// Open questions
    pub remaining_uncertainties: Vec<String>,
}

impl Synthesis {
    /// Generic synthesis used when generation degrades
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            key_findings: vec![KeyFinding {
                finding:
                    "The research conducted has provided valuable insights despite technical limitations"
                        .to_string(),
                supporting_evidence: vec![
                    "Multiple search queries were executed successfully".to_string(),
                    "A variety of sources were consulted".to_string(),
                ],
                confidence: 0.7,
            }],
            remaining_uncertainties: vec![
                "Some analyses encountered technical difficulties".to_string(),
                "A more comprehensive synthesis would require additional processing".to_string(),
            ],
        }
    }

    /// Key findings rendered as findings
    #[must_use]
    pub fn findings(&self) -> Vec<Finding> {
        self.key_findings
            .iter()
            .map(|f| Finding {
                insight: f.finding.clone(),
                evidence: f.supporting_evidence.clone(),
                confidence: f.confidence,
            })
            .collect()
    }
}

impl StructuredOutput for Synthesis {
    fn shape() -> Shape {
        Shape::object([
            (
                "key_findings",
                Shape::array(Shape::object([
                    ("finding", Shape::string()),
                    ("supporting_evidence", Shape::array(Shape::string())),
                    ("confidence", Shape::number().range(0.0, 1.0)),
                ])),
            ),
            ("remaining_uncertainties", Shape::array(Shape::string())),
        ])
    }

    fn schema_name() -> &'static str {
        "synthesis"
    }
}

/// Kind of tabular query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOperation {
    /// Broad look at the data
    #[default]
    Explore,
    /// Subset selection
    Filter,
    /// Computation over columns
    Analyze,
    /// Aggregation
    Summarize,
}

impl QueryOperation {
    /// All operations in declaration order
    pub const ALL: [Self; 4] = [Self::Explore, Self::Filter, Self::Analyze, Self::Summarize];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explore => "explore",
            Self::Filter => "filter",
            Self::Analyze => "analyze",
            Self::Summarize => "summarize",
        }
    }
}

/// SQL query in a data plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlannedQuery {
    /// SQL text
    pub query: String,
    /// Why this query
    pub rationale: String,
    /// Operation kind
    pub operation: QueryOperation,
    /// Weight 1-5
    pub priority: u8,
}

/// Data-analysis plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPlan {
    /// One or two analyses
    pub analyses: Vec<RequiredAnalysis>,
    /// One to four queries
    pub queries: Vec<PlannedQuery>,
}

impl DataPlan {
    /// Overview plan sampling the table
    #[must_use]
    pub fn fallback(table: &str) -> Self {
        Self {
            analyses: vec![RequiredAnalysis {
                kind: "overview".to_string(),
                description: "General overview of the table contents".to_string(),
                importance: 3,
            }],
            queries: vec![PlannedQuery {
                query: format!("SELECT * FROM \"{table}\" LIMIT 50"),
                rationale: "Sample rows to understand the data".to_string(),
                operation: QueryOperation::Explore,
                priority: 3,
            }],
        }
    }
}

impl StructuredOutput for DataPlan {
    fn shape() -> Shape {
        Shape::object([
            ("analyses", Shape::array(analysis_shape()).min_items(1).max_items(2)),
            (
                "queries",
                Shape::array(Shape::object([
                    ("query", Shape::string()),
                    ("rationale", Shape::string()),
                    ("operation", Shape::one_of(QueryOperation::ALL.map(QueryOperation::as_str))),
                    ("priority", Shape::integer().range(1.0, 5.0)),
                ]))
                .min_items(1)
                .max_items(4),
            ),
        ])
    }

    fn schema_name() -> &'static str {
        "data_plan"
    }
}

/// Closing summary of a data-analysis run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSummary {
    /// One-paragraph answer to the question
    pub overview: String,
    /// Findings across all analyses
    pub findings: Vec<Finding>,
    /// Business implications
    pub implications: Vec<String>,
    /// Data limitations and caveats
    pub limitations: Vec<String>,
}

impl DataSummary {
    /// Summary used when generation degrades
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            overview: String::new(),
            findings: vec![Finding {
                insight: "Analysis encountered technical difficulties".to_string(),
                evidence: vec![
                    "The analysis engine experienced validation errors while processing results."
                        .to_string(),
                    "Some queries may have returned unexpected data formats or encountered errors."
                        .to_string(),
                ],
                confidence: 0.6,
            }],
            implications: vec![
                "Further analysis with refined queries may provide more accurate insights"
                    .to_string(),
            ],
            limitations: vec![
                "Analysis was limited due to technical issues with data formatting".to_string(),
                "Generated insights may not reflect the full dataset".to_string(),
            ],
        }
    }
}

impl StructuredOutput for DataSummary {
    fn shape() -> Shape {
        Shape::object([
            ("overview", Shape::string()),
            ("findings", Shape::array(finding_shape())),
            ("implications", Shape::array(Shape::string())),
            ("limitations", Shape::array(Shape::string())),
        ])
    }

    fn schema_name() -> &'static str {
        "data_summary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_repair::minimal_valid_object;
    use delve_schema::validate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn fallback_plans_validate() {
        let plan = serde_json::to_value(ResearchPlan::fallback("remote work")).unwrap_or_default();
        assert!(validate(&ResearchPlan::shape(), &plan).is_ok());
        let plan = serde_json::to_value(DataPlan::fallback("sales")).unwrap_or_default();
        assert!(validate(&DataPlan::shape(), &plan).is_ok());
        assert_eq!(plan["queries"][0]["query"], json!("SELECT * FROM \"sales\" LIMIT 50"));
    }

    #[test]
    fn fallback_gap_analysis_and_synthesis_validate() {
        let gap = serde_json::to_value(GapAnalysis::fallback()).unwrap_or_default();
        assert!(validate(&GapAnalysis::shape(), &gap).is_ok());
        let synthesis = serde_json::to_value(Synthesis::fallback()).unwrap_or_default();
        assert!(validate(&Synthesis::shape(), &synthesis).is_ok());
    }

    #[test]
    fn minimal_objects_decode_into_payloads() {
        let plan: ResearchPlan =
            serde_json::from_value(minimal_valid_object(&ResearchPlan::shape())).unwrap_or_default();
        assert_eq!(plan.search_queries.len(), 1);
        let data: DataPlan =
            serde_json::from_value(minimal_valid_object(&DataPlan::shape())).unwrap_or_default();
        assert_eq!(data.queries[0].operation, QueryOperation::Explore);
        let summary: DataSummary =
            serde_json::from_value(minimal_valid_object(&DataSummary::shape())).unwrap_or_default();
        assert!(!summary.findings.is_empty());
    }

    #[test]
    fn limitation_confidence_is_clamped() {
        let mut gap = GapAnalysis::fallback();
        gap.limitations[0].severity = 9;
        assert_eq!(gap.limitation_findings()[0].confidence, 0.0);
        gap.limitations[0].severity = 2;
        assert!((gap.limitation_findings()[0].confidence - 0.8).abs() < 1e-9);
    }
}
