/// Counters from a harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub passes: u32,
    pub failed_passes: u32,
    pub reveals: u32,
    pub reveal_failures: u32,
    pub items_seen: u32,
    pub admitted: u32,
    pub duplicates: u32,
    pub unreadable_items: u32,
    pub groups_rejected: u32,
    pub details_extracted: u32,
    pub details_failed: u32,
    pub messages_extracted: u32,
}

impl HarvestStats {
    /// Detail extractions attempted so far, successful or not.
    pub fn details_attempted(&self) -> u32 {
        self.details_extracted + self.details_failed
    }
}

impl std::fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Complete ===")?;
        writeln!(f, "Passes:             {}", self.passes)?;
        writeln!(f, "Failed passes:      {}", self.failed_passes)?;
        writeln!(f, "Reveals:            {}", self.reveals)?;
        writeln!(f, "Reveal failures:    {}", self.reveal_failures)?;
        writeln!(f, "Rows seen:          {}", self.items_seen)?;
        writeln!(f, "Conversations:      {}", self.admitted)?;
        writeln!(f, "Already seen:       {}", self.duplicates)?;
        writeln!(f, "Unreadable rows:    {}", self.unreadable_items)?;
        writeln!(f, "Groups skipped:     {}", self.groups_rejected)?;
        if self.details_attempted() > 0 {
            writeln!(f, "\nFull history:")?;
            writeln!(f, "  Extracted: {}", self.details_extracted)?;
            writeln!(f, "  Failed:    {}", self.details_failed)?;
            writeln!(f, "  Messages:  {}", self.messages_extracted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_section_only_when_attempted() {
        let stats = HarvestStats {
            admitted: 4,
            ..Default::default()
        };
        let out = stats.to_string();
        assert!(out.contains("Conversations:      4"));
        assert!(!out.contains("Full history"));

        let stats = HarvestStats {
            details_extracted: 2,
            details_failed: 1,
            messages_extracted: 40,
            ..Default::default()
        };
        assert_eq!(stats.details_attempted(), 3);
        assert!(stats.to_string().contains("Messages:  40"));
    }
}
