use quire_editor_core::{Document, DocumentEdit, Node, NodePath, NodeType};
use quire_editor_crdt::ReplicatedDocument;

fn insert_text(path: Vec<usize>, offset: usize, text: &str) -> DocumentEdit {
    DocumentEdit::InsertText {
        path: NodePath::from(path),
        offset,
        text: text.into(),
    }
}

fn json(replica: &ReplicatedDocument) -> String {
    replica.document().to_json().unwrap()
}

#[test]
fn concurrent_edits_converge_in_any_order() {
    let mut a = ReplicatedDocument::new(1).unwrap();
    let mut b = ReplicatedDocument::new(2).unwrap();
    let mut c = ReplicatedDocument::new(3).unwrap();

    let ua = a.apply_local_edit(&insert_text(vec![0], 0, "Title")).unwrap();
    let ub = b.apply_local_edit(&insert_text(vec![1], 0, "World")).unwrap();
    let uc = c
        .apply_local_edit(&DocumentEdit::InsertNode {
            parent: NodePath::root(),
            index: 2,
            node: Node::text(NodeType::Heading, "Part one"),
        })
        .unwrap();

    a.merge_remote(&uc).unwrap();
    a.merge_remote(&ub).unwrap();
    b.merge_remote(&ua).unwrap();
    b.merge_remote(&uc).unwrap();
    c.merge_remote(&ub).unwrap();
    c.merge_remote(&ua).unwrap();

    assert_eq!(json(&a), json(&b));
    assert_eq!(json(&b), json(&c));
    assert!(a.document().validate().is_ok());
    assert_eq!(a.document().children()[0].text_content(), Some("Title"));
    assert_eq!(a.document().children().len(), 3);
}

#[test]
fn concurrent_typing_in_one_block_converges() {
    let mut a = ReplicatedDocument::new(1).unwrap();
    let mut b = ReplicatedDocument::new(2).unwrap();

    let ua = a.apply_local_edit(&insert_text(vec![1], 0, "left ")).unwrap();
    let ub = b.apply_local_edit(&insert_text(vec![1], 0, "right")).unwrap();
    a.merge_remote(&ub).unwrap();
    b.merge_remote(&ua).unwrap();

    assert_eq!(json(&a), json(&b));
    let text = a.document().children()[1].text_content().unwrap().to_string();
    assert_eq!(text.len(), "left right".len());
}

#[test]
fn merging_the_same_update_twice_is_a_noop() {
    let mut a = ReplicatedDocument::new(1).unwrap();
    let mut b = ReplicatedDocument::new(2).unwrap();
    let update = a.apply_local_edit(&insert_text(vec![1], 0, "once")).unwrap();

    let first = b.merge_remote(&update).unwrap();
    assert!(!first.is_noop());
    let after_first = json(&b);

    let second = b.merge_remote(&update).unwrap();
    assert!(second.is_noop());
    assert_eq!(json(&b), after_first);
    assert_eq!(b.document().children()[1].text_content(), Some("once"));
}

#[test]
fn concurrent_subtitles_are_repaired_identically() {
    let mut a = ReplicatedDocument::new(1).unwrap();
    let mut b = ReplicatedDocument::new(2).unwrap();
    let subtitle = |text: &str| DocumentEdit::InsertNode {
        parent: NodePath::root(),
        index: 1,
        node: Node::text(NodeType::Subtitle, text),
    };

    let ua = a.apply_local_edit(&subtitle("from a")).unwrap();
    let ub = b.apply_local_edit(&subtitle("from b")).unwrap();

    let merged_a = a.merge_remote(&ub).unwrap();
    let merged_b = b.merge_remote(&ua).unwrap();
    assert!(merged_a.repair_update.is_some());
    assert!(merged_b.repair_update.is_some());

    // Both sides repaired on their own; exchanging the repairs changes nothing.
    assert_eq!(json(&a), json(&b));
    if let Some(repair) = merged_a.repair_update {
        b.merge_remote(&repair).unwrap();
    }
    if let Some(repair) = merged_b.repair_update {
        a.merge_remote(&repair).unwrap();
    }
    assert_eq!(json(&a), json(&b));

    let doc = a.document();
    assert!(doc.validate().is_ok());
    let types: Vec<_> = doc.children().iter().map(|n| n.node_type).collect();
    assert_eq!(
        types,
        vec![
            NodeType::Title,
            NodeType::Subtitle,
            NodeType::Paragraph,
            NodeType::Paragraph
        ]
    );
}

#[test]
fn concurrent_deletes_of_last_list_item_leave_a_valid_tree() {
    let seed = Document::from_nodes(vec![
        Node::text(NodeType::Title, ""),
        Node::with_children(NodeType::List, vec![Node::paragraph("a"), Node::paragraph("b")]),
    ])
    .unwrap();
    let mut a = ReplicatedDocument::from_document(1, &seed).unwrap();
    let mut b = ReplicatedDocument::new(2).unwrap();
    b.merge_remote(&a.export_snapshot().unwrap()).unwrap();
    assert_eq!(json(&a), json(&b));

    let delete = |i: usize| DocumentEdit::DeleteNode {
        path: NodePath::from(vec![1, i]),
    };
    let ua = a.apply_local_edit(&delete(0)).unwrap();
    let ub = b.apply_local_edit(&delete(1)).unwrap();

    let ra = a.merge_remote(&ub).unwrap().repair_update;
    let rb = b.merge_remote(&ua).unwrap().repair_update;
    if let Some(r) = ra {
        b.merge_remote(&r).unwrap();
    }
    if let Some(r) = rb {
        a.merge_remote(&r).unwrap();
    }

    assert_eq!(json(&a), json(&b));
    assert!(a.document().validate().is_ok());
    // The emptied list is gone and an empty paragraph keeps the body
    // non-empty.
    let types: Vec<_> = a.document().children().iter().map(|n| n.node_type).collect();
    assert_eq!(types[0], NodeType::Title);
    assert!(!types.contains(&NodeType::List));
}

#[test]
fn delete_wins_over_concurrent_typing() {
    let mut a = ReplicatedDocument::new(1).unwrap();
    let mut b = ReplicatedDocument::new(2).unwrap();
    let setup = a
        .apply_local_edit(&DocumentEdit::InsertNode {
            parent: NodePath::root(),
            index: 2,
            node: Node::paragraph("shared"),
        })
        .unwrap();
    b.merge_remote(&setup).unwrap();

    let delete = a
        .apply_local_edit(&DocumentEdit::DeleteNode {
            path: NodePath::from(vec![2]),
        })
        .unwrap();
    let typing = b.apply_local_edit(&insert_text(vec![2], 6, " notes")).unwrap();

    a.merge_remote(&typing).unwrap();
    b.merge_remote(&delete).unwrap();

    assert_eq!(json(&a), json(&b));
    assert_eq!(a.document().children().len(), 2);
    assert!(a.document().find_node(|n| n.text_content().is_some_and(|t| t.contains("shared"))).is_none());
    assert!(b.document().validate().is_ok());
}

#[test]
fn update_waits_for_the_update_it_depends_on() {
    let mut a = ReplicatedDocument::new(1).unwrap();
    let mut b = ReplicatedDocument::new(2).unwrap();
    let first = a.apply_local_edit(&insert_text(vec![1], 0, "ab")).unwrap();
    let second = a.apply_local_edit(&insert_text(vec![1], 2, "cd")).unwrap();

    let early = b.merge_remote(&second).unwrap();
    assert!(early.is_noop());
    assert_eq!(b.document().children()[1].text_content(), Some(""));

    b.merge_remote(&first).unwrap();
    assert_eq!(b.document().children()[1].text_content(), Some("abcd"));
    assert_eq!(json(&a), json(&b));
}
