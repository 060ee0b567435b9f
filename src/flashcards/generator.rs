use super::accumulator::TextAccumulator;
use crate::config::PromptConfig;
use crate::error::{FlashgenError, Result};
use crate::models::{GeneratingState, QaPair};
use crate::ollama::TextGenerator;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Stopped on request; whatever was generated so far is kept.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Summary, question and answer generation on top of a [`TextGenerator`].
pub struct FlashcardGenerator<G> {
    generator: G,
    prompts: PromptConfig,
    publish_interval: Duration,
}

impl<G: TextGenerator> FlashcardGenerator<G> {
    pub fn new(generator: G, prompts: PromptConfig) -> Self {
        Self {
            generator,
            prompts,
            publish_interval: Duration::from_millis(100),
        }
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn prompts(&self) -> &PromptConfig {
        &self.prompts
    }

    /// Streams a summary of `document`, publishing the running text after every fragment.
    pub async fn summarize<F>(
        &self,
        document: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<Generated>
    where
        F: FnMut(&str),
    {
        if document.trim().is_empty() {
            return Err(FlashgenError::ConfigError(
                "No document text found. Please upload a file first.".into(),
            ));
        }

        let _timer = crate::logger::timer("summary");
        let prompt = format!("{}\n\n{}", self.prompts.summary, document);
        let mut summary = TextAccumulator::immediate();
        let outcome = self
            .stream_into(&prompt, cancel, &mut summary, |text| on_update(text))
            .await?;

        Ok(Generated {
            text: summary.into_text(),
            outcome,
        })
    }

    /// Generates the question for `pair`, then the answer to it.
    ///
    /// `on_update` sees the pair each time its visible state changes. When
    /// cancelled during the question, no answer is requested.
    pub async fn generate_pair<F>(
        &self,
        pair: &mut QaPair,
        summary: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<Outcome>
    where
        F: FnMut(&QaPair),
    {
        pair.question.clear();
        pair.answer.clear();
        pair.generating = GeneratingState {
            question: true,
            answer: false,
        };
        on_update(pair);

        let question_prompt = format!(
            "{}\n\nSummary:\n{}\n\nChunk:\n{}",
            self.prompts.question, summary, pair.context
        );
        let mut question = TextAccumulator::new(self.publish_interval);
        let outcome = self
            .stream_into(&question_prompt, cancel, &mut question, |text| {
                pair.question = text.to_string();
                on_update(pair);
            })
            .await;
        pair.question = question.into_text();

        match outcome {
            Ok(Outcome::Completed) => {}
            Ok(Outcome::Cancelled) => return Ok(finish_pair(pair, Outcome::Cancelled, on_update)),
            Err(e) => {
                finish_pair(pair, Outcome::Completed, on_update);
                return Err(e);
            }
        }

        pair.generating = GeneratingState {
            question: false,
            answer: true,
        };
        on_update(pair);

        let answer_prompt = format!(
            "{}\nSummary:\n{}\nChunk:\n{}\nQuestion:\n{}",
            self.prompts.answer, summary, pair.context, pair.question
        );
        let mut answer = TextAccumulator::new(self.publish_interval);
        let outcome = self
            .stream_into(&answer_prompt, cancel, &mut answer, |text| {
                pair.answer = text.to_string();
                on_update(pair);
            })
            .await;
        pair.answer = answer.into_text();

        match outcome {
            Ok(outcome) => Ok(finish_pair(pair, outcome, on_update)),
            Err(e) => {
                finish_pair(pair, Outcome::Completed, on_update);
                Err(e)
            }
        }
    }

    /// Runs [`generate_pair`](Self::generate_pair) over the selected rows, or
    /// over every row when none is selected, one after another.
    ///
    /// A failed row is logged and skipped; cancellation ends the batch.
    pub async fn generate_pairs<F>(
        &self,
        pairs: &mut [QaPair],
        summary: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(&QaPair),
    {
        let any_selected = pairs.iter().any(|pair| pair.selected);
        let total = pairs
            .iter()
            .filter(|pair| !any_selected || pair.selected)
            .count();
        if total == 0 {
            return Err(FlashgenError::ConfigError("No rows to process.".into()));
        }

        let _timer = crate::logger::timer("Q&A generation");
        let mut report = BatchReport::default();
        for pair in pairs
            .iter_mut()
            .filter(|pair| !any_selected || pair.selected)
        {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let position = report.completed + report.failed + 1;
            log::info!("Generating Q&A for row {} ({}/{})", pair.id, position, total);
            match self.generate_pair(pair, summary, cancel, &mut on_update).await {
                Ok(Outcome::Completed) => report.completed += 1,
                Ok(Outcome::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    log::error!("Error generating Q&A for row {}: {}", pair.id, e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Q&A generation finished: {} completed, {} failed{}",
            report.completed,
            report.failed,
            if report.cancelled { ", stopped by user" } else { "" }
        );
        Ok(report)
    }

    /// Feeds one generation into `acc`, publishing as the accumulator allows.
    /// The last state is always published, including after cancellation.
    async fn stream_into<P>(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
        acc: &mut TextAccumulator,
        mut publish: P,
    ) -> Result<Outcome>
    where
        P: FnMut(&str),
    {
        let result = self.drain(prompt, cancel, acc, &mut publish).await;
        if acc.flush() {
            publish(acc.text());
        }

        match result {
            Ok(()) => Ok(Outcome::Completed),
            Err(e) if e.is_cancelled() => {
                log::info!(
                    "Generation stopped by user after {} chars",
                    acc.text().chars().count()
                );
                Ok(Outcome::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    async fn drain<P>(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
        acc: &mut TextAccumulator,
        publish: &mut P,
    ) -> Result<()>
    where
        P: FnMut(&str),
    {
        let mut fragments = self
            .generator
            .generate_stream(prompt, cancel.clone())
            .await?;
        while let Some(fragment) = fragments.next().await {
            if acc.push(&fragment?) {
                publish(acc.text());
            }
        }
        Ok(())
    }
}

fn finish_pair<F>(pair: &mut QaPair, outcome: Outcome, mut on_update: F) -> Outcome
where
    F: FnMut(&QaPair),
{
    pair.generating = GeneratingState::default();
    on_update(pair);
    outcome
}
