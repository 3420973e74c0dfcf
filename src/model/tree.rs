//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Maildepot.
//
// Maildepot is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Maildepot is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Maildepot. If not, see <http://www.gnu.org/licenses/>.

//! Linearisation of folder listings into parent-before-child order.

use std::collections::{HashMap, HashSet};

use super::id::FolderId;

/// Something that sits in a folder tree.
pub trait TreeNode {
    fn node_id(&self) -> FolderId;
    fn node_parent(&self) -> Option<FolderId>;
}

impl TreeNode for super::folder::Folder {
    fn node_id(&self) -> FolderId {
        self.id
    }

    fn node_parent(&self) -> Option<FolderId> {
        self.parent_id
    }
}

/// Reorders `items` so that every item comes after its parent and before any
/// following sibling of its parent (a pre-order walk of the forest).
///
/// Siblings keep their relative order from the input, so an input already
/// sorted by some `FolderOrder` comes out sorted that way at every level.
///
/// An item whose parent is not itself in `items` (because the parent did not
/// match the listing filter) is treated as a root, in its input position
/// relative to the other roots. Nothing is dropped or invented.
pub fn sort_as_tree<T: TreeNode>(items: Vec<T>) -> Vec<T> {
    let present = items.iter().map(T::node_id).collect::<HashSet<_>>();

    let mut roots = Vec::new();
    let mut children = HashMap::<FolderId, Vec<usize>>::new();
    for (ix, item) in items.iter().enumerate() {
        match item.node_parent().filter(|p| present.contains(p)) {
            Some(parent) => children.entry(parent).or_default().push(ix),
            None => roots.push(ix),
        }
    }

    let mut order = Vec::with_capacity(items.len());
    let mut stack = roots.into_iter().rev().collect::<Vec<_>>();
    while let Some(ix) = stack.pop() {
        order.push(ix);
        if let Some(kids) = children.get(&items[ix].node_id()) {
            stack.extend(kids.iter().rev().copied());
        }
    }

    let mut slots = items.into_iter().map(Some).collect::<Vec<_>>();
    order
        .into_iter()
        .filter_map(|ix| slots[ix].take())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct N(&'static str, FolderId, Option<FolderId>);

    impl TreeNode for N {
        fn node_id(&self) -> FolderId {
            self.1
        }

        fn node_parent(&self) -> Option<FolderId> {
            self.2
        }
    }

    fn names(v: Vec<N>) -> Vec<&'static str> {
        v.into_iter().map(|n| n.0).collect()
    }

    #[test]
    fn preorder_keeps_sibling_order() {
        let [a, b, a1, a2, b1, a1x] = [(); 6].map(|_| FolderId::generate());
        let input = vec![
            N("b1", b1, Some(b)),
            N("a2", a2, Some(a)),
            N("b", b, None),
            N("a1", a1, Some(a)),
            N("a", a, None),
            N("a1x", a1x, Some(a1)),
        ];

        assert_eq!(
            vec!["b", "b1", "a", "a2", "a1", "a1x"],
            names(sort_as_tree(input))
        );
    }

    #[test]
    fn orphans_become_roots() {
        let [work, reports, q1, home] = [(); 4].map(|_| FolderId::generate());
        // "Work" itself did not match the filter
        let input = vec![
            N("Work/Reports/Q1", q1, Some(reports)),
            N("Home", home, None),
            N("Work/Reports", reports, Some(work)),
        ];
        assert_eq!(
            vec!["Work/Reports/Q1", "Work/Reports"],
            names(sort_as_tree(vec![
                N("Work/Reports/Q1", q1, Some(FolderId::generate())),
                N("Work/Reports", reports, Some(work)),
            ]))
        );

        assert_eq!(
            vec!["Home", "Work/Reports", "Work/Reports/Q1"],
            names(sort_as_tree(input))
        );
    }

    #[test]
    fn empty() {
        assert!(sort_as_tree(Vec::<N>::new()).is_empty());
    }
}
