//! End-to-end scenarios against an on-disk database

use data_manager::storage::OpenOptions;
use data_manager::{
    Collection, CollectionSerializer, Database, Datum, Error, MatchMode, NewStep, PropertyStore,
    ReferenceStore, ResultId, ResultStore, ScalarValue, StepGraph, StepStore, datum,
};

#[test]
fn test_workflow_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.sqlite");

    let (rhf, ccsd) = {
        let mut db = Database::open(&path).unwrap();
        db.unit_of_work(|conn| {
            let project = ReferenceStore::new(conn).get_or_create_project("Dummy")?;
            let steps = StepStore::new(conn);
            let rhf = steps
                .create(&NewStep::new("RHF", project.id).with_output_path("/path/to/rhf.out"))?;
            let ccsd = steps.create(&NewStep::new("CCSD", project.id))?;
            StepGraph::new(conn).add_dependency(rhf.id, ccsd.id)?;

            let serializer = CollectionSerializer::new(conn);
            serializer.insert_collection("Energy", rhf.id, &Datum::from(-76.02))?;
            serializer.insert_collection("Orbital energies", rhf.id, &datum![-20.5, -1.3, -0.7])?;
            serializer.insert_collection("Fock", ccsd.id, &datum![datum![1, 0], datum![0, 1]])?;
            Ok((rhf.id, ccsd.id))
        })
        .unwrap()
    };

    let db = Database::open_with(&path, OpenOptions { create_as_needed: false }).unwrap();
    let conn = db.connection();
    let serializer = CollectionSerializer::new(conn);

    assert_eq!(
        serializer.get_collection("Orbital energies", rhf).unwrap(),
        Collection::list([-20.5, -1.3, -0.7])
    );
    let fock = serializer.get_collection("Fock", ccsd).unwrap();
    assert_eq!(fock.shape(), data_manager::Shape::Matrix);
    assert_eq!(
        ResultStore::new(conn).find(rhf, "Energy").unwrap()[0].value,
        ScalarValue::Float(-76.02)
    );

    let graph = StepGraph::new(conn);
    assert!(graph.dependent_steps(rhf).unwrap().contains(&ccsd));
    assert!(graph.preceding_steps(ccsd).unwrap().contains(&rhf));
}

#[test]
fn test_failed_unit_of_work_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(&dir.path().join("results.sqlite")).unwrap();

    let step = db
        .unit_of_work(|conn| {
            let project = ReferenceStore::new(conn).get_or_create_project("Dummy")?;
            Ok(StepStore::new(conn).create(&NewStep::new("RHF", project.id))?.id)
        })
        .unwrap();

    let outcome = db.unit_of_work(|conn| {
        let serializer = CollectionSerializer::new(conn);
        serializer.insert_collection("Good", step, &datum![1, 2, 3])?;
        serializer.insert_collection("Bad", step, &datum![datum![1, 2], datum![3]])
    });
    assert!(matches!(outcome, Err(Error::IrregularShape(_))));

    assert_eq!(db.count_rows("results").unwrap(), 0);
    assert_eq!(db.count_rows("result_properties").unwrap(), 0);
    assert_eq!(db.count_rows("processing_steps").unwrap(), 1);
}

#[test]
fn test_project_delete_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(&dir.path().join("results.sqlite")).unwrap();

    let project = db
        .unit_of_work(|conn| {
            let project = ReferenceStore::new(conn).get_or_create_project("Dummy")?;
            let steps = StepStore::new(conn);
            let first = steps.create(&NewStep::new("RHF", project.id))?;
            let second = steps.create(&NewStep::new("CCSD", project.id))?;
            steps.properties(first.id).set("basis", "cc-pVDZ")?;
            StepGraph::new(conn).add_dependency(first.id, second.id)?;

            let results = ResultStore::new(conn);
            let energy = results.insert(first.id, "Energy", &(-1.5).into())?;
            results.insert(first.id, "Multiplicity", &1.into())?;
            results.properties(energy).set("state", "1.1")?;
            Ok(project.id)
        })
        .unwrap();

    assert_eq!(db.count_rows("results").unwrap(), 2);

    db.unit_of_work(|conn| ReferenceStore::new(conn).delete_project(project)).unwrap();

    for table in [
        "processing_steps",
        "processing_step_hierarchy",
        "processing_step_properties",
        "results",
        "result_properties",
    ] {
        assert_eq!(db.count_rows(table).unwrap(), 0, "{} should be empty", table);
    }
}

#[test]
fn test_property_queries_across_results() {
    let mut db = Database::open_in_memory().unwrap();

    let ids = db
        .unit_of_work(|conn| {
            let project = ReferenceStore::new(conn).get_or_create_project("Dummy")?;
            let step = StepStore::new(conn).create(&NewStep::new("EOM", project.id))?;
            let results = ResultStore::new(conn);

            let mut ids = Vec::new();
            for (state, symmetry) in [("1", "A1"), ("2", "B2"), ("3", "A1")] {
                let id = results.insert(step.id, "Excitation energy", &0.25.into())?;
                results.properties(id).set_all([("state", state), ("symmetry", symmetry)])?;
                ids.push(id);
            }
            Ok(ids)
        })
        .unwrap();

    let conn = db.connection();
    let a1 =
        PropertyStore::<ResultId>::any_matches(conn, &ids, &[("symmetry", "A1")], MatchMode::All)
            .unwrap();
    assert_eq!(a1, vec![ids[0], ids[2]]);

    let both = PropertyStore::<ResultId>::any_matches(
        conn,
        &ids,
        &[("symmetry", "A1"), ("state", "3")],
        MatchMode::All,
    )
    .unwrap();
    assert_eq!(both, vec![ids[2]]);

    let either = PropertyStore::<ResultId>::any_matches(
        conn,
        &ids,
        &[("symmetry", "B2"), ("state", "3")],
        MatchMode::Any,
    )
    .unwrap();
    assert_eq!(either, vec![ids[1], ids[2]]);
}

#[test]
fn test_missing_database_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.sqlite");

    let err = Database::open_with(&path, OpenOptions { create_as_needed: false }).unwrap_err();
    assert!(matches!(err, Error::DatabaseMissing(_)));
    assert!(!path.exists());
}
