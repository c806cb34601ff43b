//! Programming environment checks: compile-and-run hello worlds and MPI basics

use crate::checks::spec::{CheckSpec, OutputSource, Parameter, PerfPattern, SanityRule};
use crate::error::Result;
use crate::extraction::Extraction;
use crate::reference::{ReferenceEntry, ReferenceTable};
use crate::sanity::SanityCheck;

const HELLO_WORLD_LINE: &str = r"Hello, World from thread \s*(\d+) out of \s*(\d+) from process \s*(\d+) out of \s*(\d+)";

struct HelloWorldVariant {
    name: &'static str,
    descr: &'static str,
    valid_systems: &'static [&'static str],
    valid_prog_environs: &'static [&'static str],
    num_tasks: usize,
    num_cpus_per_task: usize,
}

const HELLO_WORLD_VARIANTS: [HelloWorldVariant; 4] = [
    HelloWorldVariant {
        name: "HelloWorldTestSerial",
        descr: "Hello, World Serial",
        valid_systems: &["cyclone:login", "cyclone:cpu"],
        valid_prog_environs: &["*"],
        num_tasks: 1,
        num_cpus_per_task: 1,
    },
    HelloWorldVariant {
        name: "HelloWorldTestOpenMP",
        descr: "Hello, World OpenMP",
        valid_systems: &["cyclone:login", "cyclone:cpu"],
        valid_prog_environs: &["*"],
        num_tasks: 1,
        num_cpus_per_task: 4,
    },
    HelloWorldVariant {
        name: "HelloWorldTestMPI",
        descr: "Hello, World MPI",
        valid_systems: &["cyclone:cpu"],
        valid_prog_environs: &["PrgEnv-gnu-nocuda", "PrgEnv-gnu", "PrgEnv-intel"],
        num_tasks: 2,
        num_cpus_per_task: 1,
    },
    HelloWorldVariant {
        name: "HelloWorldTestMPIOpenMP",
        descr: "Hello, World MPI + OpenMP",
        valid_systems: &["cyclone:cpu"],
        valid_prog_environs: &["PrgEnv-gnu-nocuda", "PrgEnv-gnu", "PrgEnv-intel"],
        num_tasks: 6,
        num_cpus_per_task: 4,
    },
];

fn hello_world(variant: &HelloWorldVariant) -> Result<CheckSpec> {
    // Compile time is reported in ns by the build wrapper and judged in s
    let references = ReferenceTable::builder()
        .entry(
            &[],
            "*",
            "compilation_time",
            ReferenceEntry::new(60.0, None, Some(0.1), "s"),
        )
        .build()?;

    CheckSpec::builder(variant.name)
        .descr(variant.descr)
        .valid_systems(variant.valid_systems)
        .valid_prog_environs(variant.valid_prog_environs)
        .parameter(Parameter::new("lang", ["c", "cpp", "f90"]))
        .sanity(SanityRule::new(SanityCheck::layout(
            HELLO_WORLD_LINE,
            variant.num_tasks,
            variant.num_cpus_per_task,
        )?))
        .perf(
            PerfPattern::new(
                "compilation_time",
                "s",
                Extraction::indexed(r"Compilations time \(ns\): (\d+)", 1)?.scaled(1.0e-9),
            )
            .reading(OutputSource::BuildStdout),
        )
        .references(references)
        .tags(&["diagnostic", "maintenance"])
        .maintainers(&["cstyl"])
        .build()
}

/// All four hello-world variants
pub fn hello_world_checks() -> Result<Vec<CheckSpec>> {
    HELLO_WORLD_VARIANTS.iter().map(hello_world).collect()
}

/// `MPI_Init_thread` returns the requested thread level
pub fn mpi_init_test() -> Result<CheckSpec> {
    let mut check = CheckSpec::builder("MpiInitTest")
        .descr("MPI_Init_thread support level")
        .valid_systems(&["cyclone:cpu"])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda", "PrgEnv-gnu", "PrgEnv-intel"])
        .parameter(Parameter::new(
            "required_thread",
            ["single", "funneled", "serialized", "multiple"],
        ))
        .sanity(SanityRule::new(SanityCheck::found(
            r"tid=0 out of 1 from rank 0 out of 1",
        )?))
        .tags(&["diagnostic", "maintenance"])
        .maintainers(&["cstyl"]);

    let queried = Extraction::named(
        r"(?m)^mpi_thread_required=\w+\s+mpi_thread_supported=\w+\s+mpi_thread_queried=\w+\s+(?P<result>\d)$",
        "result",
    )?;
    for (level, expected) in [("single", 0.0), ("funneled", 1.0), ("serialized", 2.0), ("multiple", 3.0)] {
        check = check.sanity(
            SanityRule::new(SanityCheck::equals(queried.clone(), expected))
                .when("required_thread", level),
        );
    }

    check.build()
}

/// Rank 0 receives a message from every other rank
pub fn mpi_hello_test() -> Result<CheckSpec> {
    let num_tasks = 2.0;
    CheckSpec::builder("MpiHelloTest")
        .descr("MPI Hello World")
        .valid_systems(&["cyclone:cpu"])
        .valid_prog_environs(&["PrgEnv-gnu-nocuda", "PrgEnv-gnu", "PrgEnv-intel"])
        .sanity(SanityRule::new(SanityCheck::equals(
            Extraction::named(
                r"Received correct messages from (?P<nprocs>\d+) processes",
                "nprocs",
            )?,
            num_tasks - 1.0,
        )))
        .tags(&["diagnostic", "maintenance"])
        .maintainers(&["cstyl"])
        .build()
}

/// Hello world in every language on every partition and environ
pub fn hello_multi_lang_test() -> Result<CheckSpec> {
    CheckSpec::builder("HelloMultiLangTest")
        .valid_systems(&["*"])
        .valid_prog_environs(&["*"])
        .parameter(Parameter::new("lang", ["c", "cpp", "f90"]))
        .sanity(SanityRule::new(SanityCheck::found(r"Hello, World!")?))
        .build()
}
