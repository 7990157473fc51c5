//! Daily brief processor.

use async_trait::async_trait;

use crate::brief::BriefGenerator;
use crate::jobs::{DailyBriefPayload, JobContext, JobResult, Processor};

/// Generates daily briefs in the background.
pub struct DailyBriefProcessor {
    generator: BriefGenerator,
}

impl DailyBriefProcessor {
    pub fn new(generator: BriefGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Processor for DailyBriefProcessor {
    type Payload = DailyBriefPayload;

    fn name(&self) -> &'static str {
        "daily-brief"
    }

    async fn process(&self, payload: Self::Payload, ctx: &JobContext) -> JobResult {
        ctx.log_info(&format!(
            "Generating daily brief for deal {} on {}",
            payload.deal_id, payload.date
        ));
        ctx.report_progress(10, None).await;

        let data = self.generator.generate(payload.deal_id, payload.date).await?;
        ctx.report_progress(70, Some("Brief assembled".to_string())).await;

        let brief_id = self
            .generator
            .save(payload.deal_id, payload.date, &data)
            .await?;
        ctx.report_progress(100, None).await;

        ctx.log_info(&format!("Daily brief generated: {}", brief_id));
        Ok(())
    }
}
