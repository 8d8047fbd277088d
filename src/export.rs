//! Cypher DUMP export: serialize a registry as Cypher statements.
//!
//! Produces a script that recreates every entity as a node and every relation
//! as an edge in any Cypher-compatible graph database.
//!
//! ```text
//! EntityRegistry → export_cypher_dump() → CREATE / MATCH … CREATE statements
//!   → paste into a graph browser, or pipe into a shell client
//! ```

use std::io::Write;

use crate::model::*;
use crate::registry::EntityRegistry;
use crate::storage::EntityStore;
use crate::Result;

/// Export a registry as a Cypher DUMP script.
///
/// Writes one `CREATE` per entity, then one `MATCH … CREATE` per relation.
/// Relations to targets outside the registry are skipped.
pub fn export_cypher_dump<S: EntityStore>(
    registry: &EntityRegistry<S>,
    writer: &mut dyn Write,
) -> Result<()> {
    let entities = registry.all();
    let relation_count: usize = entities.iter().map(|e| e.relations.len()).sum();

    // Header
    writeln!(writer, "// resonance-rs Cypher DUMP")?;
    writeln!(writer, "// Entities: {}", entities.len())?;
    writeln!(writer, "// Relations: {}", relation_count)?;
    writeln!(writer)?;

    for entity in &entities {
        writeln!(
            writer,
            "CREATE (:Entity:{} {{{}}});",
            label(entity.kind),
            format_properties(&entity_properties(entity))
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "// Relations")?;

    for entity in &entities {
        for rel in &entity.relations {
            if !registry.contains(&rel.target) {
                continue;
            }
            writeln!(
                writer,
                "MATCH (a:Entity {{id: {}}}), (b:Entity {{id: {}}}) CREATE (a)-[:{} {{strength: {}}}]->(b);",
                format_value(&Literal::Str(entity.id.as_str())),
                format_value(&Literal::Str(rel.target.as_str())),
                rel_type(&rel.relation_type),
                format_value(&Literal::Float(rel.strength)),
            )?;
        }
    }

    Ok(())
}

/// A Cypher literal.
enum Literal<'a> {
    Str(&'a str),
    Int(u64),
    Float(f64),
    List(Vec<Literal<'a>>),
    Null,
}

fn label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Unit => "Unit",
        EntityKind::Composite => "Composite",
        EntityKind::Cluster => "Cluster",
        EntityKind::Concept => "Concept",
    }
}

/// `derivedFrom` → `DERIVED_FROM`; anything outside `[A-Za-z0-9_]` is backquoted.
fn rel_type(relation_type: &str) -> String {
    let mut out = String::with_capacity(relation_type.len() + 4);
    for (i, c) in relation_type.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
    }
    if !out.is_empty() && out.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        out
    } else {
        format!("`{}`", relation_type.replace('`', "``"))
    }
}

fn entity_properties(entity: &Entity) -> Vec<(&'static str, Literal<'_>)> {
    let meta = &entity.metadata;
    vec![
        ("id", Literal::Str(entity.id.as_str())),
        ("name", Literal::Str(&entity.name)),
        ("kind", Literal::Str(entity.kind.as_str())),
        (
            "vector",
            Literal::List(entity.feature_vector.iter().map(|v| Literal::Float(*v)).collect()),
        ),
        ("summary", optional(&entity.derived_summary)),
        (
            "lineage",
            Literal::List(entity.lineage.iter().map(|id| Literal::Str(id.as_str())).collect()),
        ),
        ("occurrences", Literal::Int(entity.occurrences)),
        ("description", optional(&meta.description)),
        ("author", optional(&meta.author)),
        ("license", optional(&meta.license)),
        ("source_url", optional(&meta.source_url)),
    ]
}

fn optional(value: &Option<String>) -> Literal<'_> {
    value.as_deref().map_or(Literal::Null, Literal::Str)
}

/// Format properties as `key: value, ...`, skipping nulls.
fn format_properties(props: &[(&str, Literal<'_>)]) -> String {
    let mut parts = Vec::new();
    for (key, value) in props {
        if matches!(value, Literal::Null) {
            continue;
        }
        parts.push(format!("{}: {}", key, format_value(value)));
    }
    parts.join(", ")
}

fn format_value(value: &Literal<'_>) -> String {
    match value {
        Literal::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{:.1}", f),
        Literal::Float(f) => format!("{}", f),
        Literal::Null => "null".to_string(),
        Literal::List(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}
