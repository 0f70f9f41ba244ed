use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use pixel_explorer::data::sample::{CatalogBuilder, CATALOG_FILENAME};

/// Write a deterministic demo catalog with pixel files in every supported format.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output directory (catalog.json plus pixelsets/).
    #[arg(long, default_value = "sample_data")]
    out: PathBuf,
    #[arg(long, default_value_t = 24)]
    pixel_sets: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n.max(1) as u64) as usize
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct Organism {
    species: &'static str,
    reference: fn(usize) -> String,
    tag: &'static str,
}

fn yeast_reference(i: usize) -> String {
    format!("YAL{:03}C", i)
}

fn glabrata_reference(i: usize) -> String {
    format!("CAGL0A{:05}g", i * 11)
}

fn albicans_reference(i: usize) -> String {
    format!("C1_{:05}C_A", i * 10)
}

const ORGANISMS: [Organism; 3] = [
    Organism {
        species: "Saccharomyces cerevisiae",
        reference: yeast_reference,
        tag: "saccharomyces",
    },
    Organism {
        species: "Candida glabrata",
        reference: glabrata_reference,
        tag: "candida/glabrata",
    },
    Organism {
        species: "Candida albicans",
        reference: albicans_reference,
        tag: "candida/albicans",
    },
];

const FORMATS: [&str; 4] = ["csv", "tsv", "json", "parquet"];
const GENES_PER_SPECIES: usize = 400;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);
    let mut b = CatalogBuilder::seeded(args.seed);

    // Omics area tree
    let transcriptomics = b.omics_area("transcriptomics", None);
    let rna_seq = b.omics_area("rna-seq", Some(transcriptomics));
    let microarray = b.omics_area("microarray", Some(transcriptomics));
    let proteomics = b.omics_area("proteomics", None);
    let msms = b.omics_area("ms/ms", Some(proteomics));
    let areas = [rna_seq, microarray, msms];

    let stress_tags = [
        b.tag("stress/oxidative"),
        b.tag("stress/osmotic"),
        b.tag("stress/heat"),
    ];
    let time_course = b.tag("msms/time");

    for n in 0..args.pixel_sets {
        let organism = &ORGANISMS[n % ORGANISMS.len()];
        b.set_file_extension(FORMATS[n % FORMATS.len()]);
        let ps = b.pixel_set(organism.species);

        let area = areas[rng.below(areas.len())];
        b.set_omics_area(ps, area);
        let organism_tag = b.tag(organism.tag);
        b.tag_analysis(ps, organism_tag);
        let stress = stress_tags[rng.below(stress_tags.len())];
        b.tag_experiment(ps, stress);
        if area == msms {
            b.tag_experiment(ps, time_course);
        }
        b.describe_analysis(
            ps,
            &format!("Differential expression of {} under stress, run {}", organism.species, n + 1),
        );
        b.describe_experiment(ps, &format!("{} culture, replicate {}", organism.species, n % 3 + 1));

        let count = 20 + rng.below(180);
        let start = rng.below(GENES_PER_SPECIES - count);
        let references: Vec<String> = (start..start + count).map(organism.reference).collect();
        let rows: Vec<(&str, f64, Option<f64>)> = references
            .iter()
            .map(|r| {
                let value = (rng.gauss(0.0, 1.5) * 1000.0).round() / 1000.0;
                let qs = (rng.next_f64() < 0.9).then(|| (rng.next_f64() * 1000.0).round() / 1000.0);
                (r.as_str(), value, qs)
            })
            .collect();
        let unit_type = if area == msms { "protein" } else { "mRNA" };
        b.add_pixels_of_type(ps, unit_type, &rows);
    }

    let catalog = b.write_to(&args.out)?;
    log::info!(
        "wrote {} Pixel Sets ({} omics units) to {}",
        catalog.len(),
        catalog.omics_units.len(),
        args.out.join(CATALOG_FILENAME).display()
    );
    Ok(())
}
