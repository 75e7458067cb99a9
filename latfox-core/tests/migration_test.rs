//! End-to-end migration tests
//!
//! Each test builds a corpus-structure database, a FOXML source tree and a
//! version archive in a temp directory and runs the migrator over them.

use latfox_core::config::ChecksumMode;
use latfox_core::foxml::FoxmlDocument;
use latfox_core::{MigrationConfig, Migrator, ObjectOutcome, NodeId, SqliteRecordStore};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BASE: &str = "https://latserver.org/version-archive/";
const SENTINEL: &str = "000000000000000000000000";

struct Fixture {
    tmp: TempDir,
    config: MigrationConfig,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = MigrationConfig::default();
        config.database.path = tmp.path().join("corpus.sqlite");
        config.paths.fox_dir = tmp.path().join("fox");
        config.paths.target_fox_dir = tmp.path().join("fox_with_versions");
        config.paths.versions_root_dir = tmp.path().join("version-archive");
        config.paths.versions_base_url = BASE.to_string();
        config.checksum.mode = ChecksumMode::Local;
        fs::create_dir_all(&config.paths.fox_dir).unwrap();
        fs::create_dir_all(&config.paths.versions_root_dir).unwrap();

        let conn = Connection::open(&config.database.path).unwrap();
        conn.execute_batch(
            "CREATE TABLE versions (nodeid TEXT, olderversion TEXT);
             CREATE TABLE archiveobjects (nodeid INTEGER, pid TEXT, filetime TIMESTAMP, url TEXT, checksum TEXT);
             CREATE TABLE corpusnodes (nodeid INTEGER, format TEXT);",
        )
        .unwrap();

        Self { tmp, config }
    }

    fn sql(&self, sql: &str) {
        let conn = Connection::open(&self.config.database.path).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    fn foxml(&self, relative: &str, body: &str) -> PathBuf {
        let path = self.config.paths.fox_dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    fn archive_file(&self, name: &str, contents: &str) {
        fs::write(self.config.paths.versions_root_dir.join(name), contents).unwrap();
    }

    fn archive_path(&self, name: &str) -> PathBuf {
        self.config.paths.versions_root_dir.join(name)
    }

    fn output(&self, relative: &str) -> PathBuf {
        self.config.paths.target_fox_dir.join(relative)
    }
}

fn obj_foxml(label: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<foxml:digitalObject VERSION="1.1" PID="lat:object"
    xmlns:foxml="info:fedora/fedora-system:def/foxml#">
  <foxml:datastream ID="OBJ" STATE="A" CONTROL_GROUP="E" VERSIONABLE="true">
    <foxml:datastreamVersion ID="OBJ.0" LABEL="{}" MIMETYPE="audio/x-wav">
      <foxml:contentLocation TYPE="URL" REF="file:/lat/corpora/current.wav"/>
    </foxml:datastreamVersion>
  </foxml:datastream>
</foxml:digitalObject>
"#,
        label
    )
}

const CMD_FOXML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<foxml:digitalObject VERSION="1.1" PID="lat:session"
    xmlns:foxml="info:fedora/fedora-system:def/foxml#">
  <foxml:datastream ID="CMD" STATE="A" CONTROL_GROUP="X">
    <foxml:datastreamVersion ID="CMD.0" LABEL="CMD Record for this object" MIMETYPE="application/x-cmdi+xml">
      <foxml:xmlContent>
        <CMD xmlns="http://www.clarin.eu/cmd/" CMDVersion="1.1"><Header/></CMD>
      </foxml:xmlContent>
    </foxml:datastreamVersion>
  </foxml:datastream>
</foxml:digitalObject>
"#;

fn digest_of(doc: &FoxmlDocument, id: &str) -> Option<String> {
    doc.datastream_version(id)
        .unwrap()
        .child_elements()
        .find(|e| e.local_name() == "contentDigest")
        .and_then(|e| e.attribute("DIGEST"))
        .map(str::to_string)
}

fn location_of(doc: &FoxmlDocument, id: &str) -> Option<String> {
    doc.datastream_version(id)
        .unwrap()
        .child_elements()
        .find(|e| e.local_name() == "contentLocation")
        .and_then(|e| e.attribute("REF"))
        .map(str::to_string)
}

fn run(fixture: &Fixture, config: &MigrationConfig) -> latfox_core::MigrationReport {
    let store = SqliteRecordStore::open(&fixture.config.database.path).unwrap();
    Migrator::new(&store, config).unwrap().run().unwrap()
}

#[test]
fn test_three_version_binary_chain() {
    let fx = Fixture::new();
    let source = fx.foxml("corpus/lat_1839_00_0102.xml", &obj_foxml("v3_rec.wav"));
    fx.archive_file("v1_rec.wav", "first");
    fx.archive_file("v2_rec.wav", "second");
    fx.sql(&format!(
        "INSERT INTO versions VALUES ('MPI102#', 'MPI101#');
         INSERT INTO versions VALUES ('MPI101#', 'MPI100#');
         INSERT INTO versions VALUES ('MPI100#', NULL);
         INSERT INTO archiveobjects VALUES (102, 'hdl:1839/00-0102', '2012-05-05 12:00:00', '{base}current.wav', 'c0ffee');
         INSERT INTO archiveobjects VALUES (101, 'hdl:1839/00-0101', '2011-06-14 09:30:01.25', '{base}v2_rec.wav', NULL);
         INSERT INTO archiveobjects VALUES (100, 'hdl:1839/00-0100', '2010-01-02 03:04:05', '{base}v1_rec.wav', '0123abcd');
         INSERT INTO corpusnodes VALUES (100, 'audio/x-wav');
         INSERT INTO corpusnodes VALUES (101, 'audio/x-wav');",
        base = BASE
    ));

    let report = run(&fx, &fx.config);
    assert_eq!(report.rows, 3);
    assert_eq!(report.superseded, 2);
    assert_eq!(report.migrated, 1);
    assert_eq!(report.versions_added, 2);
    assert_eq!(report.failed, 0);

    let doc = FoxmlDocument::open(&fx.output("corpus/lat_1839_00_0102.xml")).unwrap();
    let versions = doc.versions("OBJ");
    let mut ids: Vec<&str> = versions.iter().map(|v| v.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["OBJ.0", "OBJ.1", "OBJ.2"]);

    let current = doc.datastream_version("OBJ.2").unwrap();
    assert_eq!(current.attribute("LABEL"), Some("v3_rec.wav"));
    assert_eq!(
        location_of(&doc, "OBJ.2").as_deref(),
        Some("file:/lat/corpora/current.wav")
    );

    let oldest = versions.iter().find(|v| v.id == "OBJ.0").unwrap();
    assert_eq!(oldest.label.as_deref(), Some("v1_rec.wav"));
    assert_eq!(oldest.created.as_deref(), Some("2010-01-02T03:04:05.000Z"));
    assert_eq!(oldest.mimetype.as_deref(), Some("audio/x-wav"));
    assert_eq!(digest_of(&doc, "OBJ.0").as_deref(), Some("0123abcd"));

    let middle = versions.iter().find(|v| v.id == "OBJ.1").unwrap();
    assert_eq!(middle.created.as_deref(), Some("2011-06-14T09:30:01.000Z"));
    // md5("second")
    assert_eq!(
        digest_of(&doc, "OBJ.1").as_deref(),
        Some("a9f0e61a137d86aa9db53465e0801612")
    );
    assert_eq!(
        location_of(&doc, "OBJ.1"),
        Some(format!("file:{}", fx.archive_path("v2_rec.wav").display()))
    );

    // Source tree is left alone
    assert_eq!(
        fs::read_to_string(&source).unwrap(),
        obj_foxml("v3_rec.wav")
    );
}

#[test]
fn test_missing_binary_still_written_without_digest() {
    let fx = Fixture::new();
    fx.foxml("lat_1839_00_0002.xml", &obj_foxml("v2.wav"));
    fx.sql(&format!(
        "INSERT INTO versions VALUES ('MPI2#', 'MPI1#');
         INSERT INTO archiveobjects VALUES (2, 'hdl:1839/00-0002', NULL, NULL, NULL);
         INSERT INTO archiveobjects VALUES (1, 'hdl:1839/00-0001', '2010-01-01 00:00:00', '{}v1.wav', NULL);
         INSERT INTO corpusnodes VALUES (1, 'audio/x-wav');",
        BASE
    ));

    let report = run(&fx, &fx.config);
    assert_eq!(report.migrated, 1);

    let doc = FoxmlDocument::open(&fx.output("lat_1839_00_0002.xml")).unwrap();
    assert_eq!(doc.versions("OBJ").len(), 2);
    assert_eq!(digest_of(&doc, "OBJ.0"), None);
    assert!(location_of(&doc, "OBJ.0").unwrap().ends_with("v1.wav"));
}

#[test]
fn test_missing_corpus_node_skips_only_that_object() {
    let fx = Fixture::new();
    fx.foxml("lat_1839_00_0002.xml", &obj_foxml("v2.wav"));
    fx.foxml("lat_1839_00_0012.xml", &obj_foxml("v2b.wav"));
    fx.archive_file("v1.wav", "a");
    fx.archive_file("v1b.wav", "b");
    fx.sql(&format!(
        "INSERT INTO versions VALUES ('MPI2#', 'MPI1#');
         INSERT INTO versions VALUES ('MPI12#', 'MPI11#');
         INSERT INTO archiveobjects VALUES (2, 'hdl:1839/00-0002', NULL, NULL, NULL);
         INSERT INTO archiveobjects VALUES (1, 'hdl:1839/00-0001', NULL, '{base}v1.wav', 'aa');
         INSERT INTO archiveobjects VALUES (12, 'hdl:1839/00-0012', NULL, NULL, NULL);
         INSERT INTO archiveobjects VALUES (11, 'hdl:1839/00-0011', NULL, '{base}v1b.wav', 'bb');
         INSERT INTO corpusnodes VALUES (11, 'audio/x-wav');",
        base = BASE
    ));

    let report = run(&fx, &fx.config);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].node_id, "MPI2#");
    assert!(report.failures[0].error.contains("corpusnodes"));
    assert_eq!(report.migrated, 1);

    assert!(!fx.output("lat_1839_00_0002.xml").exists());
    assert!(fx.output("lat_1839_00_0012.xml").exists());
}

#[test]
fn test_single_version_produces_no_output() {
    let fx = Fixture::new();
    fx.foxml("lat_1839_00_0005.xml", &obj_foxml("v1.wav"));
    fx.sql(
        "INSERT INTO versions VALUES ('MPI5#', NULL);
         INSERT INTO archiveobjects VALUES (5, 'hdl:1839/00-0005', NULL, NULL, NULL);",
    );

    let report = run(&fx, &fx.config);
    assert_eq!(report.single_version, 1);
    assert_eq!(report.migrated, 0);
    assert!(!fx.config.paths.target_fox_dir.exists());
}

#[test]
fn test_metadata_chain_with_imdi_fallback() {
    let fx = Fixture::new();
    fx.foxml("sessions/lat_1839_00_0022_CMD.xml", CMD_FOXML);
    fx.archive_file(
        "v1_session.cmdi",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CMD xmlns="http://www.clarin.eu/cmd/"
     xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
     xsi:schemaLocation="http://www.clarin.eu/cmd/ http://catalog.clarin.eu/profile.xsd"
     CMDVersion="1.1">
  <Header><MdCreator>first</MdCreator></Header>
</CMD>"#,
    );
    fx.archive_file(
        "v2_session.imdi",
        r#"<METATRANSCRIPT xmlns="http://www.mpi.nl/IMDI/Schema/IMDI"
     xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
     xsi:schemaLocation="http://www.mpi.nl/IMDI/Schema/IMDI http://www.mpi.nl/IMDI/Schema/IMDI_3.0.xsd"
     Type="SESSION"/>"#,
    );
    fx.sql(&format!(
        "INSERT INTO versions VALUES ('MPI22#', 'MPI21#');
         INSERT INTO versions VALUES ('MPI21#', 'MPI20#');
         INSERT INTO archiveobjects VALUES (22, 'hdl:1839/00-0022@format=imdi', NULL, NULL, NULL);
         INSERT INTO archiveobjects VALUES (21, 'hdl:1839/00-0021@format=imdi', '2013-02-03 04:05:06', '{base}v2_session.cmdi&outFormat=imdi', NULL);
         INSERT INTO archiveobjects VALUES (20, 'hdl:1839/00-0020@format=imdi', '2012-02-03 04:05:06', '{base}v1_session.cmdi', NULL);
         INSERT INTO corpusnodes VALUES (20, 'application/x-imdi+xml');
         INSERT INTO corpusnodes VALUES (21, 'application/x-imdi+xml');",
        base = BASE
    ));

    let report = run(&fx, &fx.config);
    assert_eq!(report.migrated, 1, "failures: {:?}", report.failures);

    let doc = FoxmlDocument::open(&fx.output("sessions/lat_1839_00_0022_CMD.xml")).unwrap();
    let versions = doc.versions("CMD");
    let ids: Vec<&str> = versions.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["CMD.1", "CMD.0", "CMD.2"]);

    let imdi = &versions[0];
    assert_eq!(imdi.label.as_deref(), Some("IMDI Record for this object"));
    assert_eq!(imdi.mimetype.as_deref(), Some("application/x-imdi+xml"));
    assert_eq!(imdi.created.as_deref(), Some("2013-02-03T04:05:06.000Z"));

    let cmd = &versions[1];
    assert_eq!(cmd.label.as_deref(), Some("CMD Record for this object"));
    assert_eq!(cmd.mimetype.as_deref(), Some("application/x-cmdi+xml"));
    assert_eq!(
        cmd.format_uri.as_deref(),
        Some("http://www.clarin.eu/cmd/ http://catalog.clarin.eu/profile.xsd")
    );

    let embedded = doc
        .datastream_version("CMD.0")
        .unwrap()
        .find(&|e: &latfox_core::xml::Element| e.local_name() == "MdCreator")
        .unwrap();
    assert_eq!(
        embedded.children,
        vec![latfox_core::xml::Node::Text("first".into())]
    );
}

#[test]
fn test_remote_checksum_sentinel_falls_back() {
    let fx = Fixture::new();
    fx.foxml("lat_1839_00_0002.xml", &obj_foxml("v2.wav"));
    fx.archive_file("v1.wav", "payload");
    fx.sql(&format!(
        "INSERT INTO versions VALUES ('MPI2#', 'MPI1#');
         INSERT INTO archiveobjects VALUES (2, 'hdl:1839/00-0002', NULL, NULL, NULL);
         INSERT INTO archiveobjects VALUES (1, 'hdl:1839/00-0001', NULL, '{}v1.wav', '');
         INSERT INTO corpusnodes VALUES (1, 'audio/x-wav');",
        BASE
    ));

    let ssh = fx.tmp.path().join("ssh");
    fs::write(
        &ssh,
        format!(
            "#!/bin/bash\ncase \"$2\" in\n  slssum*) echo '{}' ;;\n  md5sum*) echo 'feedbeef  file' ;;\n  *) exit 1 ;;\nesac\n",
            SENTINEL
        ),
    )
    .unwrap();
    make_executable(&ssh);

    let mut config = fx.config.clone();
    config.checksum.mode = ChecksumMode::Remote;
    config.checksum.ssh_command = ssh.to_string_lossy().into_owned();
    config.checksum.command = "slssum".into();
    config.checksum.fallback_command = "md5sum".into();

    let report = run(&fx, &config);
    assert_eq!(report.migrated, 1);

    let doc = FoxmlDocument::open(&fx.output("lat_1839_00_0002.xml")).unwrap();
    assert_eq!(digest_of(&doc, "OBJ.0").as_deref(), Some("feedbeef"));
}

#[test]
fn test_dry_run_outcome() {
    let fx = Fixture::new();
    fx.foxml("lat_1839_00_0002.xml", &obj_foxml("v2.wav"));
    fx.archive_file("v1.wav", "x");
    fx.sql(&format!(
        "INSERT INTO versions VALUES ('MPI2#', 'MPI1#');
         INSERT INTO archiveobjects VALUES (2, 'hdl:1839/00-0002', NULL, NULL, NULL);
         INSERT INTO archiveobjects VALUES (1, 'hdl:1839/00-0001', NULL, '{}v1.wav', 'ab');
         INSERT INTO corpusnodes VALUES (1, 'audio/x-wav');",
        BASE
    ));

    let store = SqliteRecordStore::open(&fx.config.database.path).unwrap();
    let migrator = Migrator::new(&store, &fx.config).unwrap().dry_run(true);
    match migrator.migrate_row(&NodeId::new("MPI2#")) {
        ObjectOutcome::DryRun {
            path,
            versions_added,
        } => {
            assert_eq!(path, fx.output("lat_1839_00_0002.xml"));
            assert_eq!(versions_added, 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!fx.output("lat_1839_00_0002.xml").exists());
}

fn make_executable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    #[cfg(not(unix))]
    let _ = path;
}
