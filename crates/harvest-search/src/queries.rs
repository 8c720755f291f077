//! Query sourcing and diversification. Order matters: live trends first,
//! headline transforms second, the static lexicon as the floor. Dedup is
//! aggressive because near-duplicate query streams are exactly what a
//! rate limiter clusters on.

use tracing::debug;

use harvest_rand::SecureRng;

use crate::trends::TrendsClient;

/// Transforms applied to headline terms to widen the stream.
const TRANSFORMS: &[&str] = &["what is {}", "{} news", "{} explained", "how to {}"];

/// Last-resort queries when every external source fails.
static FALLBACK_LEXICON: &[&str] = &[
    "weather tomorrow",
    "news today",
    "best pasta recipes",
    "how to tie a tie",
    "movies this week",
    "translate hello to french",
    "bank holidays this year",
    "electric cars range comparison",
    "stretching exercises morning",
    "coffee brewing ratio",
    "local restaurants near me",
    "football results yesterday",
    "how tall is mount everest",
    "time in tokyo",
    "currency exchange rate",
    "best books this year",
    "keyboard shortcuts windows",
    "houseplants low light",
    "simple dinner ideas",
    "travel checklist",
    "science news space",
    "history of the olympics",
    "diy bookshelf plans",
    "learn guitar chords",
    "healthy breakfast ideas",
    "stock market today",
    "photography tips beginners",
    "running plan 5k",
    "board games for two",
    "cheap flights weekend",
];

pub struct QueryPool {
    trends: TrendsClient,
    rng: SecureRng,
}

impl Default for QueryPool {
    fn default() -> Self {
        Self::new(TrendsClient::default())
    }
}

impl QueryPool {
    pub fn new(trends: TrendsClient) -> Self {
        Self { trends, rng: SecureRng::new() }
    }

    /// Produce up to `n` distinct queries for `locale`.
    pub async fn generate(&self, n: usize, locale: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(n);
        let mut seen: Vec<Vec<String>> = Vec::new();

        let trending = self.trends.fetch(locale).await;
        for query in &trending {
            push_deduped(&mut out, &mut seen, query);
            if out.len() >= n {
                return out;
            }
        }

        // Headline transforms over the trending terms.
        for base in &trending {
            let Some(transform) = self.rng.pick(TRANSFORMS) else { break };
            let candidate = transform.replace("{}", base);
            push_deduped(&mut out, &mut seen, &candidate);
            if out.len() >= n {
                return out;
            }
        }

        // Local lexicon floor, shuffled so repeated sessions differ.
        let mut lexicon: Vec<&str> = FALLBACK_LEXICON.to_vec();
        self.rng.shuffle(&mut lexicon);
        for query in lexicon {
            push_deduped(&mut out, &mut seen, query);
            if out.len() >= n {
                break;
            }
        }

        debug!(requested = n, produced = out.len(), "query pool generated");
        out
    }
}

fn normalise(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Similarity-bounded dedup: a candidate is dropped when its token
/// sequence is a leading subsequence of an accepted query (or vice
/// versa), so "solar eclipse" and "solar eclipse timing" never both run.
fn push_deduped(out: &mut Vec<String>, seen: &mut Vec<Vec<String>>, candidate: &str) {
    let tokens = normalise(candidate);
    if tokens.is_empty() {
        return;
    }
    for prior in seen.iter() {
        let shorter = tokens.len().min(prior.len());
        if tokens[..shorter] == prior[..shorter] {
            return;
        }
    }
    seen.push(tokens);
    out.push(candidate.trim().to_string());
}
