#![allow(dead_code)] // test helpers are shared across integration test crates

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

use ppcheck::alignment::Alignment;
use ppcheck::descriptor::AnalysisDescriptor;
use ppcheck::model::{GraphId, ModelGraph};

pub const TAXA: [&str; 4] = ["human", "chimp", "gorilla", "orang"];

/// A primates-style analysis on disk: descriptor JSON plus trace and tree
/// logs in a temp log directory.
pub struct TestContext {
    pub dir: TempDir,
    pub descriptor_path: PathBuf,
}

impl TestContext {
    pub fn new(trace_rows: usize, tree_count: usize) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let descriptor_path = dir.path().join("primates.json");

        let mut descriptor = File::create(&descriptor_path).unwrap();
        write!(descriptor, "{}", descriptor_json()).unwrap();

        let mut trace = File::create(dir.path().join("primates.log")).unwrap();
        writeln!(trace, "# generated by a prior inference run").unwrap();
        writeln!(
            trace,
            "Sample\tposterior\tclockRate.c:dna\tkappa\tfreqParameter.1\tfreqParameter.2\tfreqParameter.3\tfreqParameter.4"
        )
        .unwrap();
        for i in 0..trace_rows {
            writeln!(
                trace,
                "{}\t{}\t{}\t{}\t0.28\t0.22\t0.26\t0.24",
                i * 1000,
                -1000.0 - i as f64 * 0.25,
                0.5 + i as f64 * 0.001,
                2.0 + i as f64 * 0.01,
            )
            .unwrap();
        }

        let mut trees = File::create(dir.path().join("primates.trees")).unwrap();
        writeln!(trees, "#NEXUS").unwrap();
        writeln!(trees, "Begin trees;").unwrap();
        writeln!(trees, "\tTranslate").unwrap();
        writeln!(trees, "\t\t1 human,").unwrap();
        writeln!(trees, "\t\t2 chimp,").unwrap();
        writeln!(trees, "\t\t3 gorilla,").unwrap();
        writeln!(trees, "\t\t4 orang;").unwrap();
        for i in 0..tree_count {
            let inner = 0.1 + (i % 10) as f64 * 0.01;
            writeln!(
                trees,
                "tree STATE_{} = [&R] ((1:{inner},2:{inner}):0.1,(3:0.15,4:0.15):{:.4});",
                i * 1000,
                inner + 0.1 - 0.15,
            )
            .unwrap();
        }
        writeln!(trees, "End;").unwrap();

        Self {
            dir,
            descriptor_path,
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

pub fn descriptor_json() -> String {
    r#"{
    "id": "primates",
    "sequences": [
        {"taxon": "human",   "sequence": "ACGTACGTACGT"},
        {"taxon": "chimp",   "sequence": "ACGTACGAACGT"},
        {"taxon": "gorilla", "sequence": "ACGTTCGAACGA"},
        {"taxon": "orang",   "sequence": "ACTTTCGAACGA"}
    ],
    "trace_log": "primates.log",
    "tree_log": "primates.trees",
    "tree": "Tree.t:dna",
    "parameters": [
        {"id": "clockRate.c:dna", "lower": 0.0},
        {"id": "kappa.s:dna", "value": [2.0], "lower": 0.0},
        {"id": "freqParameter.s:dna", "dimension": 4,
         "value": [0.25, 0.25, 0.25, 0.25], "lower": 0.0, "upper": 1.0}
    ],
    "likelihood": {
        "id": "treeLikelihood.dna",
        "site_model": {
            "substitution": "hky",
            "kappa": "kappa.s:dna",
            "frequencies": "freqParameter.s:dna"
        },
        "clock": {"kind": "strict", "rate": "clockRate.c:dna"}
    }
}"#
    .to_string()
}

pub fn load_descriptor(ctx: &TestContext) -> AnalysisDescriptor {
    AnalysisDescriptor::load_from_file(&ctx.descriptor_path).unwrap()
}

/// A small catalog of clearly distinguishable alignments.
pub fn toy_alignments(count: usize) -> Vec<Alignment> {
    (0..count)
        .map(|i| {
            let block = ["AAAA", "CCCC", "GGGG", "TTTT"][i % 4];
            let shifted = ["CCCC", "GGGG", "TTTT", "AAAA"][i % 4];
            Alignment::from_sequences(
                &format!("replicate{}", i),
                &[
                    ("A".to_string(), block.repeat(2)),
                    ("B".to_string(), shifted.repeat(2)),
                ],
            )
            .unwrap()
        })
        .collect()
}

/// Graph holding just a bounded indicator, as installed by the setup.
pub fn indicator_graph(count: usize) -> (ModelGraph, GraphId) {
    let mut graph = ModelGraph::new();
    let indicator = graph
        .add_int_parameter("alignmentIndicator", 0, 0, count as i64 - 1)
        .unwrap();
    graph.add_to_state(indicator);
    (graph, indicator)
}
