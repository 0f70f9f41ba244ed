use std::collections::HashSet;

use super::model::Id;

/// Union of analysis tags and experiment tags, by tag identity.
///
/// Order of first appearance is kept: analysis tags first, then each
/// experiment's tags in turn. Two distinct tags sharing a name are both kept.
pub fn merge_tag_ids<'a, I>(analysis_tags: &'a [Id], experiment_tags: I) -> Vec<Id>
where
    I: IntoIterator<Item = &'a [Id]>,
{
    let mut seen: HashSet<Id> = HashSet::new();
    let mut merged = Vec::new();
    let all = std::iter::once(analysis_tags).chain(experiment_tags);
    for tags in all {
        for id in tags {
            if seen.insert(*id) {
                merged.push(*id);
            }
        }
    }
    merged
}

/// Whether `name` is `ancestor` itself or one of its descendants.
///
/// Tag names are compared case-insensitively since tags are stored lowercase.
pub fn is_same_or_descendant(name: &str, ancestor: &str) -> bool {
    let name = name.to_lowercase();
    let ancestor = ancestor.trim_end_matches('/').to_lowercase();
    name == ancestor
        || name
            .strip_prefix(&ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}
