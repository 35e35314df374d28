//! Seed the database with five well-known papers and their cross references
//!
//! Usage:
//!     cargo run --bin seed
//!
//! Papers that already exist are left untouched.

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use researchgraph_common::{
    config::AppConfig,
    db::{models::NewPaper, DbPool, PaperStore, Repository},
};
use tracing::info;

struct SeedPaper {
    arxiv_id: &'static str,
    title: &'static str,
    abstract_text: &'static str,
    authors: &'static [&'static str],
    categories: &'static [&'static str],
    published: (i32, u32, u32),
    references: &'static [&'static str],
    cited_by: &'static [&'static str],
}

const PAPERS: &[SeedPaper] = &[
    SeedPaper {
        arxiv_id: "1706.03762",
        title: "Attention Is All You Need",
        abstract_text: "The dominant sequence transduction models are based on complex recurrent or convolutional neural networks that include an encoder and a decoder. The best performing models also connect the encoder and decoder through an attention mechanism. We propose a new simple network architecture, the Transformer, based solely on attention mechanisms, dispensing with recurrence and convolutions entirely.",
        authors: &[
            "Ashish Vaswani",
            "Noam Shazeer",
            "Niki Parmar",
            "Jakob Uszkoreit",
            "Llion Jones",
            "Aidan N. Gomez",
            "Lukasz Kaiser",
            "Illia Polosukhin",
        ],
        categories: &["cs.CL", "cs.LG"],
        published: (2017, 6, 12),
        // Includes itself; graph views skip self-references
        references: &["1512.03385", "1409.0473", "1706.03762"],
        cited_by: &["1810.04805", "2005.14165"],
    },
    SeedPaper {
        arxiv_id: "1512.03385",
        title: "Deep Residual Learning for Image Recognition",
        abstract_text: "Deeper neural networks are more difficult to train. We present a residual learning framework to ease the training of networks that are substantially deeper than those used previously. We explicitly reformulate the layers as learning residual functions with reference to the layer inputs, instead of learning unreferenced functions.",
        authors: &["Kaiming He", "Xiangyu Zhang", "Shaoqing Ren", "Jian Sun"],
        categories: &["cs.CV", "cs.LG"],
        published: (2015, 12, 10),
        references: &[],
        cited_by: &["1706.03762"],
    },
    SeedPaper {
        arxiv_id: "1810.04805",
        title: "BERT: Pre-training of Deep Bidirectional Transformers for Language Understanding",
        abstract_text: "We introduce a new language representation model called BERT, which stands for Bidirectional Encoder Representations from Transformers. Unlike recent language representation models, BERT is designed to pre-train deep bidirectional representations from unlabeled text by jointly conditioning on both left and right context in all layers.",
        authors: &["Jacob Devlin", "Ming-Wei Chang", "Kenton Lee", "Kristina Toutanova"],
        categories: &["cs.CL"],
        published: (2018, 10, 11),
        references: &["1706.03762"],
        cited_by: &["2005.14165"],
    },
    SeedPaper {
        arxiv_id: "2005.14165",
        title: "Language Models are Few-Shot Learners",
        abstract_text: "Recent work has demonstrated substantial gains on many NLP tasks and benchmarks by pre-training on a large corpus of text followed by fine-tuning on a specific task. We show that scaling up language models greatly improves task-agnostic, few-shot performance, sometimes even reaching competitiveness with prior state-of-the-art fine-tuning approaches.",
        authors: &["Tom B. Brown", "Benjamin Mann", "Nick Ryder", "Melanie Subbiah"],
        categories: &["cs.CL", "cs.LG"],
        published: (2020, 5, 28),
        references: &["1706.03762", "1810.04805"],
        cited_by: &[],
    },
    SeedPaper {
        arxiv_id: "1409.0473",
        title: "Neural Machine Translation by Jointly Learning to Align and Translate",
        abstract_text: "Neural machine translation is a recently proposed approach to machine translation. Unlike the traditional statistical machine translation, the neural machine translation aims at building a single neural network that can be jointly tuned to maximize the translation performance. We conjecture that the use of a fixed-length vector is a bottleneck in improving the performance of this basic encoder-decoder architecture, and propose to extend this by allowing a model to automatically search for parts of a source sentence that are relevant to predicting a target word.",
        authors: &["Dzmitry Bahdanau", "Kyunghyun Cho", "Yoshua Bengio"],
        categories: &["cs.CL", "stat.ML"],
        published: (2014, 9, 1),
        references: &[],
        cited_by: &["1706.03762"],
    },
];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl SeedPaper {
    fn published_date(&self) -> Option<DateTime<Utc>> {
        let (year, month, day) = self.published;
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
    }

    fn to_new_paper(&self) -> NewPaper {
        NewPaper {
            arxiv_id: self.arxiv_id.to_string(),
            title: self.title.to_string(),
            abstract_text: Some(self.abstract_text.to_string()),
            authors: strings(self.authors),
            categories: strings(self.categories),
            references: strings(self.references),
            cited_by: strings(self.cited_by),
            published_date: self.published_date(),
            pdf_url: Some(format!("https://arxiv.org/pdf/{}", self.arxiv_id)),
        }
    }
}

/// Insert the missing demo papers, returning (inserted, skipped)
async fn seed(store: &dyn PaperStore) -> anyhow::Result<(usize, usize)> {
    let mut inserted = 0;
    let mut skipped = 0;

    for paper in PAPERS {
        if store.find_paper(paper.arxiv_id).await?.is_some() {
            info!(arxiv_id = paper.arxiv_id, title = paper.title, "Skipping existing paper");
            skipped += 1;
            continue;
        }

        store.upsert_paper(paper.to_new_paper()).await?;
        info!(arxiv_id = paper.arxiv_id, title = paper.title, "Added paper");
        inserted += 1;
    }

    Ok((inserted, skipped))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.observability.log_level))
        .init();

    info!("Seeding database with {} papers", PAPERS.len());

    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }
    let repo = Repository::new(db, config.embedding.dimension);

    let (inserted, skipped) = seed(&repo).await?;
    info!(inserted, skipped, "Seeding complete");
    Ok(())
}
