//! Cross-check shape validation against a JSON Schema validator

use delve_schema::{validate, NoDefaults, Shape};
use jsonschema::JSONSchema;
use proptest::prelude::*;
use serde_json::{json, Value};

fn research_plan() -> Shape {
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
        (
            "required_analyses",
            Shape::array(Shape::object([
                ("type", Shape::string()),
                ("description", Shape::string()),
                ("importance", Shape::integer().range(1.0, 5.0)),
            ])),
        ),
    ])
}

fn data_plan() -> Shape {
    Shape::object([
        (
            "analyses",
            Shape::array(Shape::object([
                ("type", Shape::string()),
                ("description", Shape::string()),
                ("importance", Shape::number().range(1.0, 5.0)),
            ]))
            .min_items(1)
            .max_items(2),
        ),
        (
            "queries",
            Shape::array(Shape::object([
                ("query", Shape::string()),
                ("rationale", Shape::string()),
                ("operation", Shape::one_of(["explore", "filter", "analyze", "summarize"])),
            ]))
            .min_items(1)
            .max_items(4),
        ),
        ("note", Shape::string().optional()),
    ])
}

fn compile(shape: &Shape) -> JSONSchema {
    JSONSchema::compile(&shape.to_json_schema()).expect("exported schema compiles")
}

#[test]
fn skeletons_satisfy_exported_schema() {
    for shape in [research_plan(), data_plan()] {
        let skeleton = shape.skeleton(&NoDefaults);
        assert!(validate(&shape, &skeleton).is_ok());
        assert!(compile(&shape).is_valid(&skeleton));
    }
}

#[test]
fn both_validators_reject_out_of_range_priority() {
    let shape = research_plan();
    let value = json!({
        "search_queries": [
            { "query": "q", "rationale": "r", "source": "web", "priority": 9 }
        ],
        "required_analyses": [],
    });
    assert!(validate(&shape, &value).is_err());
    assert!(!compile(&shape).is_valid(&value));
}

fn arb_query() -> impl Strategy<Value = Value> {
    (
        prop_oneof![Just(json!("q")), Just(json!(1)), Just(Value::Null)],
        prop_oneof![Just(json!("web")), Just(json!("db"))],
        prop_oneof![Just(json!(1)), Just(json!(5)), Just(json!(0)), Just(json!(2.5)), Just(json!("3"))],
    )
        .prop_map(|(query, source, priority)| {
            json!({ "query": query, "rationale": "r", "source": source, "priority": priority })
        })
}

proptest! {
    #[test]
    fn validators_agree_on_search_queries(queries in prop::collection::vec(arb_query(), 0..4)) {
        let shape = research_plan();
        let schema = compile(&shape);
        let value = json!({ "search_queries": queries, "required_analyses": [] });
        prop_assert_eq!(validate(&shape, &value).is_ok(), schema.is_valid(&value));
    }
}
