//! Partitioning elements by group tag.

use std::collections::HashMap;

use crate::element::Element;

/// Tag used by sequence detection and texture UDIM grouping.
pub const GROUP_TAG: &str = "group";

/// Partition by the `group` tag and sort each partition by file path.
///
/// Tagged partitions come first, in order of first appearance; elements
/// without the tag follow as singletons in input order.
pub fn group(elements: Vec<Element>) -> Vec<Vec<Element>> {
    let mut groups = group_by_tag(elements, GROUP_TAG);
    sort_group(&mut groups, |e| e.path().map(|p| p.to_string()), false);
    groups
}

/// Partition by the value of `tag`, keeping first-appearance order.
pub fn group_by_tag(elements: Vec<Element>, tag: &str) -> Vec<Vec<Element>> {
    let mut tagged: Vec<Vec<Element>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut singles: Vec<Vec<Element>> = Vec::new();

    for element in elements {
        let key = element.tag(tag).ok().map(ToString::to_string);
        match key {
            Some(key) => match index.get(&key) {
                Some(&i) => tagged[i].push(element),
                None => {
                    index.insert(key, tagged.len());
                    tagged.push(vec![element]);
                }
            },
            None => singles.push(vec![element]),
        }
    }

    tagged.extend(singles);
    tagged
}

/// Sort the elements inside each partition by a projection.
pub fn sort_group<K, F>(groups: &mut [Vec<Element>], key: F, reverse: bool)
where
    K: Ord,
    F: Fn(&Element) -> K,
{
    for group in groups.iter_mut() {
        group.sort_by(|a, b| {
            let ordering = key(a).cmp(&key(b));
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}
