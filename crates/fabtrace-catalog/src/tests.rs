use super::*;

fn poc(id: u32, equipment_id: u32, node_id: NodeId, utility: Option<&str>) -> EquipmentPoc {
    EquipmentPoc {
        id,
        equipment_id,
        code: format!("POC{id}"),
        node_id,
        utility: utility.map(str::to_owned),
        flow: None,
        is_used: false,
        is_active: true,
    }
}

fn equipment(id: u32, toolset: &str, node_id: NodeId) -> Equipment {
    Equipment {
        id,
        toolset_code: toolset.to_owned(),
        name: format!("EQ-{id}"),
        guid: format!("guid-{id}"),
        node_id,
        kind: Some("PRODUCTION".to_owned()),
        is_active: true,
        pocs: vec![poc(id * 10, id, node_id, Some("N2"))],
    }
}

fn toolset(code: &str, fab: &str, equipment: Vec<Equipment>) -> Toolset {
    Toolset {
        code: code.to_owned(),
        fab: fab.to_owned(),
        phase: Some("A".to_owned()),
        name: code.to_owned(),
        description: None,
        is_active: true,
        equipment,
    }
}

#[test]
fn build_indexes_toolsets_by_code() {
    let snapshot = CatalogSnapshot::build(
        "M16",
        vec![
            toolset("TS1", "M16", vec![equipment(1, "TS1", 10), equipment(2, "TS1", 20)]),
            toolset("TS2", "M16", vec![equipment(3, "TS2", 30)]),
        ],
    )
    .unwrap();

    assert_eq!(snapshot.fab(), "M16");
    assert_eq!(snapshot.toolset("TS1").unwrap().equipment.len(), 2);
    assert!(snapshot.toolset("TS3").is_none());
}

#[test]
fn build_rejects_equipment_with_wrong_owner() {
    let mut eq = equipment(1, "OTHER", 10);
    eq.toolset_code = "OTHER".to_owned();
    let err = CatalogSnapshot::build("M16", vec![toolset("TS1", "M16", vec![eq])]).unwrap_err();
    assert!(matches!(err, CatalogError::ForeignKeyMismatch { .. }));
}

#[test]
fn build_rejects_poc_with_wrong_owner() {
    let mut eq = equipment(1, "TS1", 10);
    eq.pocs[0].equipment_id = 99;
    let err = CatalogSnapshot::build("M16", vec![toolset("TS1", "M16", vec![eq])]).unwrap_err();
    assert!(matches!(err, CatalogError::PocOwnerMismatch { .. }));
}

#[test]
fn build_rejects_shared_equipment_identity() {
    // Two equipment sharing one id would leave pair selection without a
    // distinct second endpoint; the snapshot is rejected before any
    // sampling can see it.
    let err = CatalogSnapshot::build(
        "M16",
        vec![toolset(
            "TS1",
            "M16",
            vec![equipment(1, "TS1", 10), equipment(1, "TS1", 20)],
        )],
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateEquipmentId(1)));

    // Guid collisions are rejected too, across toolsets as well.
    let mut imposter = equipment(3, "TS2", 30);
    imposter.guid = "guid-1".to_owned();
    let err = CatalogSnapshot::build(
        "M16",
        vec![
            toolset("TS1", "M16", vec![equipment(1, "TS1", 10)]),
            toolset("TS2", "M16", vec![imposter]),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateEquipmentGuid(guid) if guid == "guid-1"));
}

#[test]
fn build_rejects_foreign_fab_and_duplicates() {
    let err = CatalogSnapshot::build("M16", vec![toolset("TS1", "M15", vec![])]).unwrap_err();
    assert!(matches!(err, CatalogError::WrongFab { .. }));

    let err = CatalogSnapshot::build(
        "M16",
        vec![toolset("TS1", "M16", vec![]), toolset("TS1", "M16", vec![])],
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateToolset(_)));
}

#[test]
fn usable_toolsets_require_two_active_equipment() {
    let mut lone = toolset("TS2", "M16", vec![equipment(3, "TS2", 30)]);
    lone.equipment.push({
        let mut eq = equipment(4, "TS2", 40);
        eq.is_active = false;
        eq
    });

    let snapshot = CatalogSnapshot::build(
        "M16",
        vec![
            toolset("TS1", "M16", vec![equipment(1, "TS1", 10), equipment(2, "TS1", 20)]),
            lone,
        ],
    )
    .unwrap();

    let usable: Vec<&str> = snapshot.usable_toolsets().map(|ts| ts.code.as_str()).collect();
    assert_eq!(usable, vec!["TS1"]);
}

#[test]
fn toolset_utilities_are_deduped_and_sorted() {
    let mut eq_a = equipment(1, "TS1", 10);
    eq_a.pocs = vec![
        poc(11, 1, 10, Some("N2")),
        poc(12, 1, 11, Some("CDA")),
        poc(13, 1, 12, None),
    ];
    let mut eq_b = equipment(2, "TS1", 20);
    eq_b.pocs = vec![poc(21, 2, 20, Some("N2"))];

    let ts = toolset("TS1", "M16", vec![eq_a, eq_b]);
    assert_eq!(ts.utilities(), vec!["CDA".to_owned(), "N2".to_owned()]);
    assert_eq!(ts.category(), Some("PRODUCTION"));
}

#[test]
fn json_roundtrip_revalidates() {
    let snapshot = CatalogSnapshot::build(
        "M16",
        vec![toolset(
            "TS1",
            "M16",
            vec![equipment(1, "TS1", 10), equipment(2, "TS1", 20)],
        )],
    )
    .unwrap();

    let raw = serde_json::to_string(&snapshot).unwrap();
    let restored = CatalogSnapshot::from_json(&raw).unwrap();
    assert!(restored.toolset("TS1").is_some());
    assert!(restored.has_usable_toolset());
}
