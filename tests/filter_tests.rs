/*!
 * Unit tests for the query-expression builder.
 * No server required.
 */

use anyhow::Result;
use mongolink::filter::{and, field, nor, not, or, query, ElementKind};
use mongolink::{doc, Bson, Document};

#[test]
fn eq_matches_the_literal_document_byte_for_byte() -> Result<()> {
    let built: Document = field("foo").eq(3).into();
    let literal = doc! { "foo": { "$eq": 3 } };
    assert_eq!(built, literal);
    assert_eq!(built.to_bytes()?, literal.to_bytes()?);
    Ok(())
}

#[test]
fn comparison_operators() {
    assert_eq!(Document::from(field("a").ne(1)), doc! { "a": { "$ne": 1 } });
    assert_eq!(Document::from(field("a").gt(1)), doc! { "a": { "$gt": 1 } });
    assert_eq!(Document::from(field("a").lt(1)), doc! { "a": { "$lt": 1 } });
    assert_eq!(Document::from(field("a").gte(1)), doc! { "a": { "$gte": 1 } });
    assert_eq!(Document::from(field("a").lte(1)), doc! { "a": { "$lte": 1 } });
}

#[test]
fn membership_operators() {
    assert_eq!(
        Document::from(field("color").is_in(["red", "blue"])),
        doc! { "color": { "$in": ["red", "blue"] } }
    );
    assert_eq!(
        Document::from(field("n").not_in([1, 2, 3])),
        doc! { "n": { "$nin": [1, 2, 3] } }
    );
}

#[test]
fn type_size_all_exists() {
    assert_eq!(
        Document::from(field("x").is_type(ElementKind::String)),
        doc! { "x": { "$type": 2 } }
    );
    assert_eq!(
        Document::from(field("x").is_type_any([ElementKind::Int32, ElementKind::Int64])),
        doc! { "x": { "$type": [16, 18] } }
    );
    assert_eq!(
        Document::from(field("xs").size(3)),
        doc! { "xs": { "$size": 3i64 } }
    );
    assert_eq!(
        Document::from(field("xs").all([1, 2])),
        doc! { "xs": { "$all": [1, 2] } }
    );
    assert_eq!(
        Document::from(field("x").exists(true)),
        doc! { "x": { "$exists": true } }
    );
}

#[test]
fn logical_combinators() {
    let built = and([field("a").gt(1), field("b").lt(2)]);
    assert_eq!(
        Document::from(built),
        doc! { "$and": [ { "a": { "$gt": 1 } }, { "b": { "$lt": 2 } } ] }
    );
    assert_eq!(
        Document::from(or([field("a").eq(1), field("a").eq(2)])),
        doc! { "$or": [ { "a": { "$eq": 1 } }, { "a": { "$eq": 2 } } ] }
    );
    assert_eq!(
        Document::from(nor([field("a").eq(1)])),
        doc! { "$nor": [ { "a": { "$eq": 1 } } ] }
    );
    assert_eq!(
        Document::from(not(field("a").eq(1))),
        doc! { "$not": [ { "a": { "$eq": 1 } } ] }
    );
}

#[test]
fn sibling_statements_preserve_order_and_duplicates() {
    let filter = query([
        field("a").gt(1),
        field("b").eq("x"),
        field("a").lt(10),
    ]);
    let entries: Vec<(String, Bson)> = filter.clone().into_iter().collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].0, "a");
    assert_eq!(entries[1].0, "b");
    assert_eq!(entries[2].0, "a");
    assert_eq!(entries[0].1, Bson::Document(doc! { "$gt": 1 }));
    assert_eq!(entries[2].1, Bson::Document(doc! { "$lt": 10 }));
}

#[test]
fn expressions_nest_inside_logical_trees() {
    let filter = Document::from(or([
        and([field("age").gte(18), field("age").lt(65)]),
        field("vip").eq(true),
    ]));
    let expected = doc! {
        "$or": [
            { "$and": [ { "age": { "$gte": 18 } }, { "age": { "$lt": 65 } } ] },
            { "vip": { "$eq": true } },
        ]
    };
    assert_eq!(filter, expected);
}
