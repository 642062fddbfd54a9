//! Rendering of [`Query`] expressions to RediSearch `FT.SEARCH` syntax.
//!
//! ```text
//! @name:anvil               term
//! @name:(steel anvil)       phrase (all terms)
//! @name:*vil*               contains
//! @name:anv*                prefix
//! @name:%anvil%             fuzzy, distance 1
//! @price:[10 (50]           numeric range, `(` marks an exclusive bound
//! @vendor_name:{Acme}       tag
//! a b / (a | b) / -(a)      and / or / not
//! *                         everything
//! ```
//!
//! Equality on a TAG field is rendered as a tag match. Booleans become
//! `[1 1]`/`[0 0]` numeric ranges unless the backend stores them natively.

use std::fmt::Write;
use std::ops::Bound;

use super::expression::{FieldOperator, FieldQuery, Query, QueryNode, QueryValue};
use crate::backend::{BackendCapabilities, IndexDefinition, IndexFieldType};

const SPECIAL: &[char] = &[
    '@', ':', '|', '(', ')', '[', ']', '{', '}', '*', '%', '-', '+', '~', '!', '"', '\'', '\\', '$', '&', '^', '=',
    '<', '>', ',', ';',
];

/// Renders query expressions for one index.
#[derive(Debug, Clone, Copy, Default)]
pub struct RediSearchTranslator<'a> {
    index: Option<&'a IndexDefinition>,
    capabilities: BackendCapabilities,
}

impl<'a> RediSearchTranslator<'a> {
    /// Translator aware of an index's field types and the backend's capabilities.
    pub fn for_index(index: &'a IndexDefinition, capabilities: BackendCapabilities) -> Self {
        Self {
            index: Some(index),
            capabilities,
        }
    }

    /// Renders without index context: no tag detection, numeric booleans.
    pub fn translate(query: &Query) -> String {
        RediSearchTranslator::default().render(query)
    }

    pub fn render(&self, query: &Query) -> String {
        let mut out = String::new();
        self.node(&mut out, &query.root);
        out
    }

    fn is_tag(&self, field: &str) -> bool {
        self.index
            .and_then(|index| index.get(field))
            .is_some_and(|f| f.field_type == IndexFieldType::Tag)
    }

    fn node(&self, out: &mut String, node: &QueryNode) {
        match node {
            QueryNode::All => out.push('*'),
            QueryNode::Field(predicate) => self.predicate(out, predicate),
            QueryNode::And(nodes) => self.group(out, nodes, " "),
            QueryNode::Or(nodes) => self.group(out, nodes, " | "),
            QueryNode::Not(inner) => {
                out.push_str("-(");
                self.node(out, inner);
                out.push(')');
            }
        }
    }

    fn group(&self, out: &mut String, nodes: &[QueryNode], separator: &str) {
        match nodes {
            [] => out.push('*'),
            [single] => self.node(out, single),
            _ => {
                out.push('(');
                for (i, node) in nodes.iter().enumerate() {
                    if i > 0 {
                        out.push_str(separator);
                    }
                    self.node(out, node);
                }
                out.push(')');
            }
        }
    }

    fn predicate(&self, out: &mut String, predicate: &FieldQuery) {
        out.push('@');
        if predicate.field.chars().all(|c| c.is_alphanumeric() || c == '_') {
            out.push_str(&predicate.field);
        } else {
            let _ = write!(out, "`{}`", predicate.field);
        }
        out.push(':');

        match (predicate.operator, &predicate.value) {
            (FieldOperator::Equals, QueryValue::Text(text)) if self.is_tag(&predicate.field) => {
                out.push('{');
                escape(out, text, false);
                out.push('}');
            }
            (FieldOperator::Equals, QueryValue::Text(text)) if text.contains(' ') => {
                out.push('(');
                escape(out, text, true);
                out.push(')');
            }
            (FieldOperator::Equals, QueryValue::Text(text)) => escape(out, text, false),
            (FieldOperator::Equals, QueryValue::Numeric(n)) => {
                let _ = write!(out, "[{} {}]", n, n);
            }
            (FieldOperator::Equals, QueryValue::Boolean(b)) if self.capabilities.native_boolean => {
                let _ = write!(out, "{{{}}}", b);
            }
            (FieldOperator::Equals, QueryValue::Boolean(b)) => {
                let n = u8::from(*b);
                let _ = write!(out, "[{} {}]", n, n);
            }
            (FieldOperator::Range, QueryValue::NumericRange { min, max }) => {
                out.push('[');
                bound(out, min, "-inf");
                out.push(' ');
                bound(out, max, "+inf");
                out.push(']');
            }
            (FieldOperator::In, QueryValue::Tags(tags)) => {
                out.push('{');
                for (i, tag) in tags.iter().enumerate() {
                    if i > 0 {
                        out.push('|');
                    }
                    escape(out, tag, false);
                }
                out.push('}');
            }
            (FieldOperator::Contains, QueryValue::Text(text)) => {
                out.push('*');
                escape(out, text, true);
                out.push('*');
            }
            (FieldOperator::Prefix, QueryValue::Text(text)) => {
                escape(out, text, false);
                out.push('*');
            }
            (FieldOperator::Fuzzy, QueryValue::Text(text)) => {
                out.push('%');
                escape(out, text, false);
                out.push('%');
            }
            // Value shapes the operator does not take match as an escaped literal
            (_, value) => escape(out, &literal(value), false),
        }
    }
}

fn escape(out: &mut String, value: &str, keep_spaces: bool) {
    for c in value.chars() {
        if SPECIAL.contains(&c) || (c == ' ' && !keep_spaces) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn bound(out: &mut String, bound: &Bound<f64>, open: &str) {
    let _ = match bound {
        Bound::Included(v) => write!(out, "{}", v),
        Bound::Excluded(v) => write!(out, "({}", v),
        Bound::Unbounded => write!(out, "{}", open),
    };
}

fn literal(value: &QueryValue) -> String {
    match value {
        QueryValue::Text(text) => text.clone(),
        QueryValue::Numeric(n) => n.to_string(),
        QueryValue::Boolean(b) => b.to_string(),
        QueryValue::Tags(tags) => tags.join(" "),
        QueryValue::NumericRange { .. } => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Field;

    fn render(query: Query) -> String {
        RediSearchTranslator::translate(&query)
    }

    fn product_index() -> IndexDefinition {
        IndexDefinition::new("redis_search", "ProductDocument")
            .field("name", "$.name", IndexFieldType::Text, true)
            .field("price", "$.price", IndexFieldType::Numeric, true)
            .field("vendor_name", "$.vendor.name", IndexFieldType::Tag, false)
            .field("tags_name", "$.tags[*].name", IndexFieldType::Tag, false)
    }

    #[test]
    fn test_terms_and_phrases() {
        assert_eq!(render(Query::field_eq("name", "anvil")), "@name:anvil");
        assert_eq!(render(Query::field_eq("name", "steel anvil")), "@name:(steel anvil)");
        assert_eq!(render(Query::text_search("name", "vil")), "@name:*vil*");
        assert_eq!(render(Query::prefix("name", "anv")), "@name:anv*");
        assert_eq!(render(Query::fuzzy("name", "anvul")), "@name:%anvul%");
    }

    #[test]
    fn test_numeric_bounds() {
        let price = Field::new("price");
        assert_eq!(render(price.between(10.0, 50.0)), "@price:[10 50]");
        assert_eq!(render(price.gt(10.0)), "@price:[(10 +inf]");
        assert_eq!(render(price.lt(9.5)), "@price:[-inf (9.5]");
        assert_eq!(render(Query::numeric_range("price", None, None)), "@price:[-inf +inf]");
        assert_eq!(render(Query::numeric_eq("price", 12.0)), "@price:[12 12]");
    }

    #[test]
    fn test_grouping() {
        let name = Field::new("name");
        let query = (name.eq("anvil") | name.eq("mallet")) & !Field::new("price").ge(100.0);
        assert_eq!(render(query), "((@name:anvil | @name:mallet) -(@price:[100 +inf]))");
        assert_eq!(render(Query::all()), "*");
        assert_eq!(render(Query::and_all([Query::all(), Query::prefix("name", "a")])), "(* @name:a*)");
    }

    #[test]
    fn test_tag_membership_escapes_spaces() {
        let query = Field::new("tags_name").one_of(["heavy duty", "steel"]);
        assert_eq!(render(query), "@tags_name:{heavy\\ duty|steel}");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(render(Query::field_eq("email", "sales@acme.com")), "@email:sales\\@acme.com");
        assert_eq!(render(Query::field_eq("sku", "AB-12:3")), "@sku:AB\\-12\\:3");
        assert_eq!(render(Query::field_eq("name", "half (used) anvil")), "@name:(half \\(used\\) anvil)");
        assert_eq!(render(Query::field_eq("odd.field", "x")), "@`odd.field`:x");
    }

    #[test]
    fn test_equality_on_tag_field() {
        let index = product_index();
        let translator = RediSearchTranslator::for_index(&index, BackendCapabilities::default());
        let query = Field::embedded("vendor", "name").eq("Acme Tools") & Field::new("name").eq("anvil");
        assert_eq!(translator.render(&query), "(@vendor_name:{Acme\\ Tools} @name:anvil)");
    }

    #[test]
    fn test_booleans_follow_capabilities() {
        let query = Field::new("available").is(true) & Field::new("archived").is(false);
        assert_eq!(render(query.clone()), "(@available:[1 1] @archived:[0 0])");

        let index = product_index();
        let native = RediSearchTranslator::for_index(&index, BackendCapabilities { native_boolean: true });
        assert_eq!(native.render(&query), "(@available:{true} @archived:{false})");
    }

    #[test]
    fn test_mismatched_value_renders_literal() {
        let query = Query::new(QueryNode::Field(FieldQuery {
            field: "name".into(),
            operator: FieldOperator::Contains,
            value: QueryValue::Numeric(3.0),
        }));
        assert_eq!(render(query), "@name:3");
    }
}
