// CSV bulk operations.
//
// Rows are processed strictly in file order because a row may reference a
// location created by an earlier row. A failing row is recorded in the
// `BatchReport` and the batch moves on; only failures that make the whole
// batch meaningless (unreadable file, missing header, listing the server)
// abort it.

use crate::api::{Client, Transport};
use crate::error::{Error, Result};
use crate::models::{Item, ItemCreate, ItemUpdate, Location, Tag};
use crate::paths::{self, LocationTree};
use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use tracing::{info, warn};

pub const ITEM_COLUMNS: [&str; 6] = ["id", "name", "description", "quantity", "locationPath", "tags"];

/// Quantity given to items created from a row that leaves it blank.
const DEFAULT_QUANTITY: u32 = 1;

/// What to do with tag names the server does not know yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagPolicy {
    /// Fail the row.
    #[default]
    Reject,
    /// Create the tag and use it.
    Create,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub ignore_case: bool,
    pub tags: TagPolicy,
}

#[derive(Debug)]
pub enum Outcome {
    Created(String),
    Updated(String),
    Unchanged(String),
    Skipped(String),
    /// Dry run: what would have been done.
    Planned(String),
    Failed(Error),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created(_) => "created",
            Outcome::Updated(_) => "updated",
            Outcome::Unchanged(_) => "unchanged",
            Outcome::Skipped(_) => "skipped",
            Outcome::Planned(_) => "planned",
            Outcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created(id) | Outcome::Updated(id) | Outcome::Unchanged(id) => {
                write!(f, "{} {id}", self.label())
            }
            Outcome::Skipped(why) | Outcome::Planned(why) => write!(f, "{}: {why}", self.label()),
            Outcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Outcome of one CSV row. `line` is the line number in the input file.
#[derive(Debug)]
pub struct RowReport {
    pub line: u64,
    pub key: String,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub rows: Vec<RowReport>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &RowReport> {
        self.rows.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// `(label, count)` for every outcome kind that occurred, in first-seen
    /// order.
    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for row in &self.rows {
            let label = row.outcome.label();
            match counts.iter_mut().find(|(l, _)| *l == label) {
                Some((_, n)) => *n += 1,
                None => counts.push((label, 1)),
            }
        }
        counts
    }
}

/// Batch progress, for whoever draws a progress bar.
pub enum Progress<'a> {
    Started { total: usize },
    Row(&'a RowReport),
}

/// Export-shaped row. All columns are plain strings so that a bad quantity
/// is reported as a row failure rather than a CSV decoding error.
#[derive(Debug, Serialize, Deserialize)]
struct ItemRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    quantity: String,
    #[serde(rename = "locationPath", default)]
    location_path: String,
    #[serde(default)]
    tags: String,
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parent: String,
}

/// Write every item as one CSV row, in the order the server lists them.
/// Returns the number of rows written.
pub fn export_items<T: Transport, W: Write>(client: &Client<T>, out: W) -> Result<usize> {
    let tree = client.location_tree()?;
    let tag_names: HashMap<String, String> = client
        .get_tags()?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();
    let items = client.get_items()?;

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(ITEM_COLUMNS)?;
    for item in &items {
        let location_path = match item.location_id() {
            Some(id) => tree.path_of(id)?,
            None => String::new(),
        };
        let names: Vec<&str> = item
            .tags
            .iter()
            .map(|t| tag_names.get(&t.id).map_or(t.name.as_str(), String::as_str))
            .collect();
        let tags = encode_tags(&names)?;
        writer.serialize(ItemRow {
            id: item.id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            quantity: item.quantity.to_string(),
            location_path,
            tags,
        })?;
    }
    writer.flush()?;
    info!(rows = items.len(), "exported items");
    Ok(items.len())
}

/// Create one location per `name,description,parent` row.
///
/// Locations that already exist under the resolved parent are skipped.
pub fn import_locations<T, R, F>(
    client: &Client<T>,
    input: R,
    options: BatchOptions,
    mut progress: F,
) -> Result<BatchReport>
where
    T: Transport,
    R: Read,
    F: FnMut(Progress<'_>),
{
    let (headers, records) = read_records(input, &["name"])?;
    progress(Progress::Started {
        total: records.len(),
    });

    let mut tree = client.location_tree()?;
    let mut report = BatchReport::default();
    for record in records {
        let line = line_of(&record);
        let (key, outcome) = match record.deserialize::<LocationRow>(Some(&headers)) {
            Ok(row) => {
                let key = if row.parent.trim().is_empty() {
                    row.name.clone()
                } else {
                    format!("{}{}{}", row.parent, paths::SEPARATOR, row.name)
                };
                let outcome = import_location_row(client, &mut tree, &row, line, options)
                    .unwrap_or_else(Outcome::Failed);
                (key, outcome)
            }
            Err(e) => (String::new(), Outcome::Failed(Error::validation(e.to_string()))),
        };
        push_row(&mut report, &mut progress, line, key, outcome);
    }
    Ok(report)
}

fn import_location_row<T: Transport>(
    client: &Client<T>,
    tree: &mut LocationTree,
    row: &LocationRow,
    line: u64,
    options: BatchOptions,
) -> Result<Outcome> {
    if row.name.trim().is_empty() {
        return Err(Error::validation("name is required"));
    }
    let parent_id = if row.parent.trim().is_empty() {
        None
    } else {
        Some(tree.resolve(&row.parent, options.ignore_case)?.id.clone())
    };

    if let Some(existing) = tree.child(parent_id.as_deref(), &row.name, options.ignore_case) {
        return Ok(Outcome::Skipped(format!("already exists as {}", existing.id)));
    }

    if options.dry_run {
        // Placeholder so later rows can hang off this one.
        let id = format!("dry-run-{line}");
        tree.insert(Location {
            id: id.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            parent_id,
        });
        info!(name = %row.name, "dry run: would create location");
        return Ok(Outcome::Planned(format!("would create location '{}'", row.name)));
    }

    let created = client.create_location_with_parent_id(&row.name, &row.description, parent_id)?;
    let id = created.id.clone();
    tree.insert(created);
    Ok(Outcome::Created(id))
}

/// Apply an export-shaped CSV: rows with an `id` update that item, rows
/// without one create a new item.
///
/// A column missing from the header leaves that field alone. A present but
/// empty `locationPath` or `quantity` also leaves it alone; an empty
/// `description` or `tags` clears it. Locations are never created here.
pub fn update_items<T, R, F>(
    client: &Client<T>,
    input: R,
    options: BatchOptions,
    mut progress: F,
) -> Result<BatchReport>
where
    T: Transport,
    R: Read,
    F: FnMut(Progress<'_>),
{
    let (headers, records) = read_records(input, &["name"])?;
    let columns = Columns::from_headers(&headers);
    progress(Progress::Started {
        total: records.len(),
    });

    let tree = client.location_tree()?;
    let mut tags = client.get_tags()?;
    let items: HashMap<String, Item> = client
        .get_items()?
        .into_iter()
        .map(|i| (i.id.clone(), i))
        .collect();

    let mut report = BatchReport::default();
    for record in records {
        let line = line_of(&record);
        let (key, outcome) = match record.deserialize::<ItemRow>(Some(&headers)) {
            Ok(mut row) => {
                // Only the id and quantity are trimmed; text fields are kept
                // as written so an unedited export matches the server.
                row.id = row.id.trim().to_string();
                row.quantity = row.quantity.trim().to_string();
                let key = if row.id.is_empty() {
                    row.name.clone()
                } else {
                    row.id.clone()
                };
                let ctx = UpdateContext {
                    tree: &tree,
                    items: &items,
                    columns,
                    options,
                    line,
                };
                let outcome = update_item_row(client, &ctx, &mut tags, &row)
                    .unwrap_or_else(Outcome::Failed);
                (key, outcome)
            }
            Err(e) => (String::new(), Outcome::Failed(Error::validation(e.to_string()))),
        };
        push_row(&mut report, &mut progress, line, key, outcome);
    }
    Ok(report)
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    description: bool,
    quantity: bool,
    location_path: bool,
    tags: bool,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let has = |name: &str| headers.iter().any(|h| h == name);
        Columns {
            description: has("description"),
            quantity: has("quantity"),
            location_path: has("locationPath"),
            tags: has("tags"),
        }
    }
}

struct UpdateContext<'a> {
    tree: &'a LocationTree,
    items: &'a HashMap<String, Item>,
    columns: Columns,
    options: BatchOptions,
    line: u64,
}

fn update_item_row<T: Transport>(
    client: &Client<T>,
    ctx: &UpdateContext<'_>,
    tags: &mut Vec<Tag>,
    row: &ItemRow,
) -> Result<Outcome> {
    if row.name.trim().is_empty() {
        return Err(Error::validation("name is required"));
    }
    let quantity = if ctx.columns.quantity {
        parse_quantity(&row.quantity)?
    } else {
        None
    };
    let location_id = if ctx.columns.location_path && !row.location_path.trim().is_empty() {
        Some(ctx.tree.resolve(&row.location_path, ctx.options.ignore_case)?.id.clone())
    } else {
        None
    };
    if row.id.is_empty() && location_id.is_none() {
        return Err(Error::validation("locationPath is required to create an item"));
    }
    if !row.id.is_empty() && ctx.options.dry_run && !ctx.items.contains_key(&row.id) {
        return Err(Error::not_found("item", row.id.as_str()));
    }
    let tag_ids = if ctx.columns.tags {
        Some(resolve_tags(client, tags, &row.tags, ctx.options, ctx.line)?)
    } else {
        None
    };

    if row.id.is_empty() {
        if ctx.options.dry_run {
            info!(name = %row.name, "dry run: would create item");
            return Ok(Outcome::Planned(format!("would create item '{}'", row.name)));
        }
        let created = client.create_item(&ItemCreate {
            name: row.name.clone(),
            description: row.description.clone(),
            quantity: quantity.unwrap_or(DEFAULT_QUANTITY),
            location_id: location_id.unwrap_or_default(),
            tag_ids: tag_ids.unwrap_or_default(),
        })?;
        return Ok(Outcome::Created(created.id));
    }

    let update = ItemUpdate {
        name: Some(row.name.clone()),
        description: ctx.columns.description.then(|| row.description.clone()),
        quantity,
        location_id,
        tag_ids,
    };
    if let Some(current) = ctx.items.get(&row.id) {
        if !update.changes(current) {
            return Ok(Outcome::Unchanged(row.id.clone()));
        }
    }
    if ctx.options.dry_run {
        info!(id = %row.id, "dry run: would update item");
        return Ok(Outcome::Planned(format!("would update item {}", row.id)));
    }
    let updated = client.update_item(&row.id, &update)?;
    Ok(Outcome::Updated(updated.id))
}

/// Blank means "not given". Anything else must be a non-negative integer.
fn parse_quantity(raw: &str) -> Result<Option<u32>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value: i64 = raw
        .parse()
        .map_err(|_| Error::validation(format!("quantity '{raw}' is not an integer")))?;
    if value < 0 {
        return Err(Error::validation(format!("quantity must not be negative, got {value}")));
    }
    u32::try_from(value)
        .map(Some)
        .map_err(|_| Error::validation(format!("quantity {value} is too large")))
}

/// Join tag names into one `tags` cell. The list is itself a CSV record,
/// so a name containing a comma or a quote is quoted and survives a round
/// trip.
fn encode_tags(names: &[&str]) -> Result<String> {
    if names.is_empty() {
        return Ok(String::new());
    }
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(names)?;
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    let cell = String::from_utf8(bytes).map_err(|e| Error::validation(e.to_string()))?;
    Ok(cell.trim_end_matches('\n').to_string())
}

/// Inverse of `encode_tags`. Names keep their whitespace here; blank names
/// are dropped.
fn decode_tags(field: &str) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(field.as_bytes());
    let mut names = Vec::new();
    for record in reader.records() {
        names.extend(
            record?
                .iter()
                .filter(|n| !n.trim().is_empty())
                .map(str::to_string),
        );
    }
    Ok(names)
}

/// Map a `tags` cell to tag ids, creating unknown tags when the policy
/// allows. Newly created tags are added to `tags` so later rows reuse them.
fn resolve_tags<T: Transport>(
    client: &Client<T>,
    tags: &mut Vec<Tag>,
    field: &str,
    options: BatchOptions,
    line: u64,
) -> Result<Vec<String>> {
    let names = decode_tags(field)?;

    // Check everything before creating anything.
    let missing: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| find_tag(tags, n, options.ignore_case).is_none())
        .map(str::trim)
        .collect();
    if let Some(first) = missing.first() {
        if options.tags == TagPolicy::Reject {
            return Err(Error::not_found("tag", *first));
        }
    }

    for name in missing {
        // A name may repeat within one field.
        if find_tag(tags, name, options.ignore_case).is_some() {
            continue;
        }
        let tag = if options.dry_run {
            info!(name, "dry run: would create tag");
            Tag {
                id: format!("dry-run-{line}-{name}"),
                name: name.to_string(),
            }
        } else {
            client.create_tag(name)?
        };
        tags.push(tag);
    }

    let mut ids = Vec::with_capacity(names.len());
    for name in &names {
        let id = find_tag(tags, name, options.ignore_case)
            .ok_or_else(|| Error::not_found("tag", name.trim()))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Exact name first, then the trimmed name, like location segments.
fn find_tag(tags: &[Tag], name: &str, ignore_case: bool) -> Option<String> {
    let find = |wanted: &str| {
        tags.iter().find(|t| {
            if ignore_case {
                t.name.to_lowercase() == wanted.to_lowercase()
            } else {
                t.name == wanted
            }
        })
    };
    find(name).or_else(|| find(name.trim())).map(|t| t.id.clone())
}

fn read_records<R: Read>(input: R, required: &[&str]) -> Result<(StringRecord, Vec<StringRecord>)> {
    let mut reader = ReaderBuilder::new().trim(Trim::Headers).from_reader(input);
    let headers = reader.headers()?.clone();
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(Error::validation(format!("CSV header has no '{column}' column")));
        }
    }
    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((headers, records))
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or_default()
}

fn push_row<F: FnMut(Progress<'_>)>(
    report: &mut BatchReport,
    progress: &mut F,
    line: u64,
    key: String,
    outcome: Outcome,
) {
    if let Outcome::Failed(err) = &outcome {
        warn!(line, key = %key, error = %err, "row failed");
    }
    report.rows.push(RowReport { line, key, outcome });
    if let Some(row) = report.rows.last() {
        progress(Progress::Row(row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("").unwrap(), None);
        assert_eq!(parse_quantity("4").unwrap(), Some(4));
        assert!(matches!(parse_quantity("-1"), Err(Error::Validation(_))));
        assert!(matches!(parse_quantity("two"), Err(Error::Validation(_))));
        assert!(matches!(parse_quantity("99999999999"), Err(Error::Validation(_))));
    }

    #[test]
    fn missing_required_header_rejects_the_file() {
        let err = read_records("description,parent\nx,y\n".as_bytes(), &["name"]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn records_keep_their_line_numbers() {
        let (_, records) = read_records("name\nA\nB\n".as_bytes(), &["name"]).unwrap();
        let lines: Vec<_> = records.iter().map(line_of).collect();
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn tag_cells_quote_names_with_commas() {
        let cell = encode_tags(&["nuts, bolts", "tools"]).unwrap();
        assert_eq!(cell, "\"nuts, bolts\",tools");
        assert_eq!(decode_tags(&cell).unwrap(), ["nuts, bolts", "tools"]);
        assert_eq!(encode_tags(&[]).unwrap(), "");
        assert_eq!(decode_tags("tools, hardware").unwrap(), ["tools", " hardware"]);
        assert!(decode_tags("").unwrap().is_empty());
    }

    #[test]
    fn text_fields_keep_their_whitespace() {
        let (headers, records) =
            read_records(" id , name \ni1,Hammer \n".as_bytes(), &["name"]).unwrap();
        assert_eq!(&headers[1], "name");
        assert_eq!(&records[0][1], "Hammer ");
    }

    #[test]
    fn counts_group_by_outcome() {
        let report = BatchReport {
            rows: vec![
                RowReport { line: 2, key: "a".into(), outcome: Outcome::Created("1".into()) },
                RowReport { line: 3, key: "b".into(), outcome: Outcome::Failed(Error::validation("x")) },
                RowReport { line: 4, key: "c".into(), outcome: Outcome::Created("2".into()) },
            ],
        };
        assert!(report.has_failures());
        assert_eq!(report.counts(), vec![("created", 2), ("failed", 1)]);
    }
}
