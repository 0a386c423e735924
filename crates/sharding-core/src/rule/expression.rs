//! Data node expression resolver.
//!
//! Expands a compact rule such as `ds_${0..1}.t_order_${[0, 1]}` into the
//! explicit, ordered list of data nodes it denotes.  Patterns are comma
//! separated; each pattern is `<data source>.<table>` and each side carries at
//! most one enumerable segment:
//!
//! * `${a..b}`: inclusive integer range, ascending.  A lower bound written
//!   with leading zeros (`${00..15}`) pads every value to that width.
//! * `${[x, y]}` or `${x, y}`: explicit list, in list order.
//!
//! `$->{...}` is accepted as an alias for `${...}`.  Segments expand as a
//! Cartesian product, leftmost segment outermost, and patterns are
//! concatenated in source order.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

use crate::errors::{ShardingError, ShardingResult};
use crate::guards::MAX_DATA_NODES;
use crate::models::DataNode;

// ---------------------------------------------------------------------------
// Regex patterns
// ---------------------------------------------------------------------------

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:->)?\{([^{}]*)\}").unwrap());

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-?\d+)\s*\.\.\s*(-?\d+)\s*$").unwrap());

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").unwrap());

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Segment(Vec<String>),
}

fn segment_count(pieces: &[Piece]) -> usize {
    pieces
        .iter()
        .filter(|p| matches!(p, Piece::Segment(_)))
        .count()
}

/// Split `text` at commas that are not inside `{...}`.
fn split_top_level(expression: &str, text: &str) -> ShardingResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ShardingError::invalid_expression(expression, "unexpected '}'")
                })?;
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(ShardingError::invalid_expression(
            expression,
            "unterminated segment",
        ));
    }
    parts.push(current);
    Ok(parts)
}

/// Byte offset of the first `.` outside a segment.
fn split_point(pattern: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in pattern.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

fn parse_template(expression: &str, text: &str) -> ShardingResult<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in SEGMENT_RE.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let body = caps.get(1).map_or("", |m| m.as_str());
        push_literal(expression, &mut pieces, &text[last..whole.start])?;
        pieces.push(Piece::Segment(parse_segment(expression, body)?));
        last = whole.end;
    }
    push_literal(expression, &mut pieces, &text[last..])?;
    Ok(pieces)
}

fn push_literal(expression: &str, pieces: &mut Vec<Piece>, literal: &str) -> ShardingResult<()> {
    if literal.contains(['{', '}', '$']) {
        return Err(ShardingError::invalid_expression(
            expression,
            format!("malformed segment near '{literal}'"),
        ));
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal.to_string()));
    }
    Ok(())
}

fn parse_segment(expression: &str, body: &str) -> ShardingResult<Vec<String>> {
    if let Some(caps) = RANGE_RE.captures(body) {
        let lower_text = &caps[1];
        let lower: i64 = lower_text.parse().map_err(|_| {
            ShardingError::invalid_expression(expression, format!("bad range bound '{lower_text}'"))
        })?;
        let upper: i64 = caps[2].parse().map_err(|_| {
            ShardingError::invalid_expression(expression, format!("bad range bound '{}'", &caps[2]))
        })?;
        if lower > upper {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("range lower bound {lower} exceeds upper bound {upper}"),
            ));
        }
        let count = upper.abs_diff(lower).saturating_add(1);
        if count > MAX_DATA_NODES as u64 {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("range {lower}..{upper} expands to more than {MAX_DATA_NODES} values"),
            ));
        }
        let width = if lower_text.len() > 1 && lower_text.starts_with('0') {
            lower_text.len()
        } else {
            0
        };
        return Ok((lower..=upper).map(|v| format!("{v:0width$}")).collect());
    }

    let trimmed = body.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    let mut items = Vec::new();
    for raw in inner.split(',') {
        let item = unquote(raw.trim());
        if item.is_empty() || !LIST_ITEM_RE.is_match(item) {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("malformed segment '{body}'"),
            ));
        }
        items.push(item.to_string());
    }
    Ok(items)
}

fn unquote(item: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = item
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner;
        }
    }
    item
}

fn expand_pieces(expression: &str, pieces: &[Piece]) -> ShardingResult<Vec<String>> {
    let mut results = vec![String::new()];
    for piece in pieces {
        match piece {
            Piece::Literal(text) => {
                for result in &mut results {
                    result.push_str(text);
                }
            }
            Piece::Segment(values) => {
                if results.len().saturating_mul(values.len()) > MAX_DATA_NODES {
                    return Err(ShardingError::invalid_expression(
                        expression,
                        format!("expands to more than {MAX_DATA_NODES} values"),
                    ));
                }
                results = results
                    .iter()
                    .flat_map(|prefix| values.iter().map(move |v| format!("{prefix}{v}")))
                    .collect();
            }
        }
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Expand a plain template list such as `ds_${0..1}, ds_backup` into names.
///
/// Unlike [`resolve_data_nodes`] the text is not split into data source and
/// table, and any number of segments is allowed per pattern.
pub fn expand_inline(expression: &str) -> ShardingResult<Vec<String>> {
    let mut names = Vec::new();
    for pattern in split_top_level(expression, expression)? {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ShardingError::invalid_expression(expression, "empty pattern"));
        }
        let pieces = parse_template(expression, pattern)?;
        names.extend(expand_pieces(expression, &pieces)?);
        if names.len() > MAX_DATA_NODES {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("expands to more than {MAX_DATA_NODES} values"),
            ));
        }
    }
    Ok(names)
}

/// Resolve a data node expression into its ordered data nodes.
///
/// Fails when a range is reversed, a segment is malformed, or two patterns
/// produce the same data node.
pub fn resolve_data_nodes(expression: &str) -> ShardingResult<Vec<DataNode>> {
    if expression.trim().is_empty() {
        return Err(ShardingError::invalid_expression(expression, "empty expression"));
    }
    let mut nodes: IndexSet<DataNode> = IndexSet::new();
    for pattern in split_top_level(expression, expression)? {
        let pattern = pattern.trim();
        let dot = split_point(pattern).ok_or_else(|| {
            ShardingError::invalid_expression(
                expression,
                format!("pattern '{pattern}' is not of the form <data source>.<table>"),
            )
        })?;
        let (ds_text, table_text) = (pattern[..dot].trim(), pattern[dot + 1..].trim());
        if ds_text.is_empty() || table_text.is_empty() {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("pattern '{pattern}' has an empty side"),
            ));
        }

        let ds_pieces = parse_template(expression, ds_text)?;
        let table_pieces = parse_template(expression, table_text)?;
        if segment_count(&ds_pieces) > 1 || segment_count(&table_pieces) > 1 {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("pattern '{pattern}' has more than one segment on one side"),
            ));
        }

        let data_sources = expand_pieces(expression, &ds_pieces)?;
        let tables = expand_pieces(expression, &table_pieces)?;
        if nodes
            .len()
            .saturating_add(data_sources.len().saturating_mul(tables.len()))
            > MAX_DATA_NODES
        {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("expands to more than {MAX_DATA_NODES} data nodes"),
            ));
        }
        for ds in &data_sources {
            for table in &tables {
                let node = DataNode::new(ds.as_str(), table.as_str());
                if nodes.contains(&node) {
                    return Err(ShardingError::invalid_expression(
                        expression,
                        format!("duplicate data node {node}"),
                    ));
                }
                nodes.insert(node);
            }
        }
    }
    Ok(nodes.into_iter().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
