//! Plain-text readers for rating and trust files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::dataset::InteractionStore;
use crate::prelude::*;
use crate::trust::TrustGraph;

/// Field separator of a rating file.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Delimiter {
    /// `user<TAB>item<TAB>rating`
    #[default]
    Tab,

    /// `user item rating`, any amount of whitespace
    Space,
}

impl Delimiter {
    fn split<'a>(self, line: &'a str) -> Vec<&'a str> {
        match self {
            Self::Tab => line.split('\t').map(str::trim).collect(),
            Self::Space => line.split_whitespace().collect(),
        }
    }
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_ratings(path: &Path, delimiter: Delimiter) -> Result<InteractionStore> {
    let start_instant = Instant::now();
    let file = File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
    let store = parse_ratings(BufReader::new(file), delimiter)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    info!(n_ratings = store.count(), elapsed = ?start_instant.elapsed(), "loaded");
    Ok(store)
}

/// Parses `user item rating` lines. Extra trailing fields, such as timestamps, are ignored.
pub fn parse_ratings<R: BufRead>(reader: R, delimiter: Delimiter) -> Result<InteractionStore> {
    let mut store = InteractionStore::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = delimiter.split(&line);
        let (user_id, item_id, rating) = match fields.as_slice() {
            [user_id, item_id, rating, ..] => (
                parse_field::<usize>(user_id, "user ID", line_number)?,
                parse_field::<usize>(item_id, "item ID", line_number)?,
                parse_field::<i32>(rating, "rating", line_number)?,
            ),
            _ => bail!("line {}: expected at least 3 fields, got {}", line_number + 1, fields.len()),
        };
        store.add(user_id, item_id, rating);
    }
    Ok(store)
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_trust_graph(path: &Path) -> Result<TrustGraph> {
    let file = File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
    let graph = parse_trust_graph(BufReader::new(file))
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    info!(n_users = graph.n_users(), n_edges = graph.n_edges(), "loaded");
    Ok(graph)
}

/// Parses whitespace-separated `truster trustee` lines.
pub fn parse_trust_graph<R: BufRead>(reader: R) -> Result<TrustGraph> {
    let mut graph = TrustGraph::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let fields = line.split_whitespace().collect_vec();
        match fields.as_slice() {
            [] => continue,
            [truster, trustee, ..] => {
                graph.add(
                    parse_field(truster, "truster ID", line_number)?,
                    parse_field(trustee, "trustee ID", line_number)?,
                );
            }
            _ => bail!("line {}: expected 2 fields", line_number + 1),
        }
    }
    Ok(graph)
}

fn parse_field<T>(value: &str, name: &str, line_number: usize) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value).with_context(|| format!("line {}: invalid {} `{}`", line_number + 1, name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tab_ok() -> crate::Result {
        let store = parse_ratings("1\t2\t5\n\n3\t4\t1\t978300760\n".as_bytes(), Delimiter::Tab)?;
        assert_eq!(store.count(), 2);
        assert_eq!(store.record(1).item_id, 4);
        assert_eq!(store.record(1).rating, 1);
        Ok(())
    }

    #[test]
    fn parse_space_ok() -> crate::Result {
        let store = parse_ratings(" 1  2 5\n3 4 1\n".as_bytes(), Delimiter::Space)?;
        assert_eq!(store.count(), 2);
        assert_eq!(store.record(0).user_id, 1);
        Ok(())
    }

    #[test]
    fn parse_negative_id_fails() {
        assert!(parse_ratings("-1\t2\t5\n".as_bytes(), Delimiter::Tab).is_err());
    }

    #[test]
    fn parse_short_line_fails() {
        let error = parse_ratings("1\t2\t5\n1\t2\n".as_bytes(), Delimiter::Tab).unwrap_err();
        assert!(error.to_string().contains("line 2"));
    }

    #[test]
    fn parse_trust_graph_ok() -> crate::Result {
        let graph = parse_trust_graph(" 1 2\n 1 3\n\n3 1\n".as_bytes())?;
        assert_eq!(graph.n_edges(), 3);
        assert_eq!(graph.n_trusted(1), 2);
        assert_eq!(graph.trusted_by(1).collect_vec(), vec![3]);
        Ok(())
    }
}
