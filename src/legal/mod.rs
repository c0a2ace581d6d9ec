//! Legal corpus — read-only statutory and case-law grounding.
//!
//! Georgia code sections, federal code sections, constitutional amendments
//! with key holdings, and landmark-case summaries, keyed by citation token.
//! The corpus ships with the binary and never changes during a session; the
//! analysis prompts cite these entries directly instead of relying on model
//! recall.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalKind {
    Statute,
    FederalCode,
    Amendment,
    LandmarkCase,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegalFact {
    /// Canonical citation token, e.g. `O.C.G.A. § 16-5-21` or `384 U.S. 436`.
    pub citation: String,
    pub title: String,
    pub text: String,
    pub kind: LegalKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub statutes: usize,
    pub federal_sections: usize,
    pub amendments: usize,
    pub landmark_cases: usize,
}

/// Charges map to the statutes that define them, the defenses that apply,
/// and the procedural provisions that govern them.
struct ChargeLaw {
    pattern: &'static str,
    sections: &'static [&'static str],
}

pub struct LegalCorpus {
    facts: Vec<LegalFact>,
    by_citation: HashMap<String, usize>,
}

impl LegalCorpus {
    pub fn load() -> Arc<Self> {
        let facts = builtin_facts();
        let by_citation = facts
            .iter()
            .enumerate()
            .map(|(i, f)| (normalize_citation(&f.citation), i))
            .collect();
        Arc::new(Self { facts, by_citation })
    }

    /// Exact lookup by citation token (whitespace/punctuation tolerant).
    pub fn get(&self, citation: &str) -> Option<&LegalFact> {
        self.by_citation
            .get(&normalize_citation(citation))
            .map(|&i| &self.facts[i])
    }

    /// Term search over titles and text. Deterministic ordering by citation.
    pub fn search(&self, term: &str, kind: Option<LegalKind>) -> Vec<&LegalFact> {
        let needle = term.to_lowercase();
        let mut hits: Vec<&LegalFact> = self
            .facts
            .iter()
            .filter(|f| kind.map(|k| f.kind == k).unwrap_or(true))
            .filter(|f| {
                f.title.to_lowercase().contains(&needle)
                    || f.text.to_lowercase().contains(&needle)
                    || f.citation.to_lowercase().contains(&needle)
            })
            .collect();
        hits.sort_by(|a, b| a.citation.cmp(&b.citation));
        hits
    }

    /// Statutes, defenses, and procedural law relevant to a set of charges or
    /// free-form topics, rendered as a markdown digest.
    pub fn digest_for_topics(&self, topics: &[String], char_cap: usize) -> String {
        let mut sections: Vec<&str> = Vec::new();
        for topic in topics {
            let lowered = topic.to_lowercase();
            for entry in CHARGE_LAW {
                if lowered.contains(entry.pattern) {
                    for s in entry.sections {
                        if !sections.contains(s) {
                            sections.push(s);
                        }
                    }
                }
            }
        }
        // Constitutional baseline travels with every digest.
        for baseline in ["U.S. Const. amend. IV", "U.S. Const. amend. V", "U.S. Const. amend. VI"] {
            if !sections.contains(&baseline) {
                sections.push(baseline);
            }
        }

        let mut out = String::from("# LEGAL AUTHORITY\n\n");
        for citation in &sections {
            if let Some(fact) = self.get(citation) {
                let entry = format!("## {} — {}\n{}\n\n", fact.citation, fact.title, fact.text);
                if out.len() + entry.len() > char_cap {
                    break;
                }
                out.push_str(&entry);
            }
        }
        // Topic hits outside the charge map (e.g. ad-hoc research terms).
        for topic in topics {
            for fact in self.search(topic, None).into_iter().take(2) {
                if sections.iter().any(|s| normalize_citation(s) == normalize_citation(&fact.citation)) {
                    continue;
                }
                let entry = format!("## {} — {}\n{}\n\n", fact.citation, fact.title, fact.text);
                if out.len() + entry.len() > char_cap {
                    return out;
                }
                out.push_str(&entry);
            }
        }
        out
    }

    pub fn stats(&self) -> CorpusStats {
        let count = |k: LegalKind| self.facts.iter().filter(|f| f.kind == k).count();
        CorpusStats {
            statutes: count(LegalKind::Statute),
            federal_sections: count(LegalKind::FederalCode),
            amendments: count(LegalKind::Amendment),
            landmark_cases: count(LegalKind::LandmarkCase),
        }
    }
}

fn normalize_citation(citation: &str) -> String {
    citation
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

fn fact(kind: LegalKind, citation: &str, title: &str, text: &str) -> LegalFact {
    LegalFact {
        citation: citation.to_string(),
        title: title.to_string(),
        text: text.to_string(),
        kind,
    }
}

fn builtin_facts() -> Vec<LegalFact> {
    use LegalKind::*;
    vec![
        // ── Georgia statutes ─────────────────────────────────────────────
        fact(Statute, "O.C.G.A. § 16-5-1", "Murder; felony murder",
            "A person commits murder when he unlawfully and with malice aforethought, either express or implied, causes the death of another human being. A person commits felony murder when, in the commission of a felony, he or she causes the death of another human being irrespective of malice."),
        fact(Statute, "O.C.G.A. § 16-5-20", "Simple assault",
            "A person commits simple assault when he or she either attempts to commit a violent injury to the person of another or commits an act which places another in reasonable apprehension of immediately receiving a violent injury."),
        fact(Statute, "O.C.G.A. § 16-5-21", "Aggravated assault",
            "A person commits aggravated assault when he or she assaults with intent to murder, to rape, or to rob; with a deadly weapon or with any object, device, or instrument which, when used offensively against a person, is likely to or actually does result in serious bodily injury; or by discharging a firearm from within a motor vehicle toward a person or persons."),
        fact(Statute, "O.C.G.A. § 16-5-23.1", "Battery",
            "A person commits battery when he or she intentionally causes substantial physical harm or visible bodily harm to another. Visible bodily harm means bodily harm capable of being perceived by a person other than the victim, including substantially blackened eyes, swollen lips, or substantial bruises."),
        fact(Statute, "O.C.G.A. § 16-7-1", "Burglary",
            "A person commits burglary in the first degree when, without authority and with the intent to commit a felony or theft therein, he or she enters or remains within an occupied, unoccupied, or vacant dwelling house of another. Burglary in the second degree covers the same conduct within any other building, structure, vehicle, railroad car, watercraft, or aircraft."),
        fact(Statute, "O.C.G.A. § 16-7-21", "Criminal trespass",
            "A person commits criminal trespass when he or she intentionally damages any property of another without consent (damage $500.00 or less) or knowingly and without authority enters upon the land or premises of another after receiving notice that such entry is forbidden."),
        fact(Statute, "O.C.G.A. § 16-8-2", "Theft by taking",
            "A person commits theft by taking when he unlawfully takes or, being in lawful possession thereof, unlawfully appropriates any property of another with the intention of depriving him of the property, regardless of the manner in which the property is taken or appropriated."),
        fact(Statute, "O.C.G.A. § 16-8-14", "Theft by shoplifting",
            "A person commits theft by shoplifting when such person, with the intent of appropriating merchandise to his or her own use without paying for the same, conceals or takes possession of the goods or merchandise of any store or retail establishment, alters the price tag, transfers goods from one container to another, or interchanges labels or price tags."),
        fact(Statute, "O.C.G.A. § 16-8-40", "Robbery",
            "A person commits robbery when, with intent to commit theft, he takes property of another from the person or the immediate presence of another by use of force, by intimidation, by the use of threat or coercion, or by sudden snatching."),
        fact(Statute, "O.C.G.A. § 16-8-41", "Armed robbery",
            "A person commits armed robbery when, with intent to commit theft, he or she takes property of another from the person or the immediate presence of another by use of an offensive weapon, or any replica, article, or device having the appearance of such weapon."),
        fact(Statute, "O.C.G.A. § 16-10-24", "Obstruction of officers",
            "A person who knowingly and willfully obstructs or hinders any law enforcement officer in the lawful discharge of his or her official duties commits a misdemeanor. A person who does so by offering or doing violence to the person of such officer commits a felony."),
        fact(Statute, "O.C.G.A. § 16-13-30", "Controlled substances; possession and distribution",
            "It is unlawful for any person to purchase, possess, or have under his or her control any controlled substance, or to manufacture, deliver, distribute, dispense, administer, sell, or possess with intent to distribute any controlled substance."),
        fact(Statute, "O.C.G.A. § 40-6-391", "Driving under the influence",
            "A person shall not drive or be in actual physical control of any moving vehicle while under the influence of alcohol to the extent that it is less safe for the person to drive, or while the person's alcohol concentration is 0.08 grams or more at any time within three hours after such driving from alcohol consumed before such driving ended."),
        fact(Statute, "O.C.G.A. § 16-3-21", "Use of force in defense of self or others",
            "A person is justified in threatening or using force against another when and to the extent that he or she reasonably believes that such threat or force is necessary to defend himself or herself or a third person against such other's imminent use of unlawful force."),
        fact(Statute, "O.C.G.A. § 17-7-170", "Demand for speedy trial",
            "A defendant may enter a demand for speedy trial at the court term at which the indictment or accusation is filed or at the next succeeding regular court term. If the defendant is not tried when the demand is made or at the next succeeding regular court term, provided juries were impaneled and qualified to try the defendant, the defendant shall be absolutely discharged and acquitted."),
        fact(Statute, "O.C.G.A. § 17-6-1", "Bail; offenses bailable",
            "Offenses are bailable only before a judge of the superior court where enumerated serious felonies are charged. The court shall be authorized to release a person on bail if the court finds the person poses no significant risk of fleeing, threatening the community, committing a felony pending trial, or intimidating witnesses."),
        // ── Federal code ─────────────────────────────────────────────────
        fact(FederalCode, "18 U.S.C. § 922", "Unlawful acts — firearms",
            "Prohibits, among other acts, possession of a firearm by any person convicted of a crime punishable by imprisonment for a term exceeding one year, and transport or receipt of firearms in interstate commerce by prohibited persons."),
        fact(FederalCode, "21 U.S.C. § 841", "Prohibited acts — controlled substances",
            "Except as authorized, it shall be unlawful for any person knowingly or intentionally to manufacture, distribute, or dispense, or possess with intent to manufacture, distribute, or dispense, a controlled substance."),
        fact(FederalCode, "42 U.S.C. § 1983", "Civil action for deprivation of rights",
            "Every person who, under color of any statute, ordinance, regulation, custom, or usage of any State subjects any citizen of the United States to the deprivation of any rights, privileges, or immunities secured by the Constitution and laws, shall be liable to the party injured."),
        // ── Constitutional amendments ────────────────────────────────────
        fact(Amendment, "U.S. Const. amend. IV", "Search and seizure",
            "The right of the people to be secure in their persons, houses, papers, and effects, against unreasonable searches and seizures, shall not be violated, and no Warrants shall issue, but upon probable cause. Evidence obtained in violation is subject to exclusion (Mapp v. Ohio); warrantless searches are per se unreasonable subject to specifically established exceptions (Katz v. United States)."),
        fact(Amendment, "U.S. Const. amend. V", "Self-incrimination; due process; double jeopardy",
            "No person shall be compelled in any criminal case to be a witness against himself, nor be deprived of life, liberty, or property, without due process of law; nor shall any person be subject for the same offence to be twice put in jeopardy. Custodial interrogation requires the Miranda warnings."),
        fact(Amendment, "U.S. Const. amend. VI", "Speedy trial; counsel; confrontation",
            "In all criminal prosecutions, the accused shall enjoy the right to a speedy and public trial, by an impartial jury, to be confronted with the witnesses against him, and to have the Assistance of Counsel for his defence. The right to counsel applies to the states (Gideon v. Wainwright); its effective assistance is measured under Strickland v. Washington."),
        fact(Amendment, "U.S. Const. amend. VIII", "Excessive bail; cruel and unusual punishment",
            "Excessive bail shall not be required, nor excessive fines imposed, nor cruel and unusual punishments inflicted."),
        fact(Amendment, "U.S. Const. amend. XIV", "Due process; equal protection",
            "No State shall deprive any person of life, liberty, or property, without due process of law; nor deny to any person within its jurisdiction the equal protection of the laws. The vehicle by which most Bill of Rights protections apply against the states."),
        // ── Landmark cases ───────────────────────────────────────────────
        fact(LandmarkCase, "384 U.S. 436", "Miranda v. Arizona (1966)",
            "Statements obtained during custodial interrogation are inadmissible unless the suspect was warned of the right to remain silent and the right to counsel, and knowingly waived those rights."),
        fact(LandmarkCase, "367 U.S. 643", "Mapp v. Ohio (1961)",
            "The exclusionary rule applies to the states: evidence obtained through unconstitutional searches and seizures is inadmissible in state criminal prosecutions."),
        fact(LandmarkCase, "373 U.S. 83", "Brady v. Maryland (1963)",
            "Suppression by the prosecution of evidence favorable to an accused violates due process where the evidence is material either to guilt or to punishment, irrespective of the good faith or bad faith of the prosecution."),
        fact(LandmarkCase, "405 U.S. 150", "Giglio v. United States (1972)",
            "Brady extends to impeachment evidence: the prosecution must disclose deals, promises, or inducements offered to its witnesses."),
        fact(LandmarkCase, "372 U.S. 335", "Gideon v. Wainwright (1963)",
            "The Sixth Amendment right to counsel is fundamental and applies to state felony prosecutions; indigent defendants must be provided counsel."),
        fact(LandmarkCase, "392 U.S. 1", "Terry v. Ohio (1968)",
            "An officer may conduct a brief investigative stop supported by reasonable articulable suspicion, and a limited pat-down for weapons where the officer reasonably believes the person is armed and dangerous."),
        fact(LandmarkCase, "389 U.S. 347", "Katz v. United States (1967)",
            "The Fourth Amendment protects people, not places; what a person seeks to preserve as private, even in an area accessible to the public, may be constitutionally protected."),
        fact(LandmarkCase, "466 U.S. 668", "Strickland v. Washington (1984)",
            "Ineffective assistance of counsel requires showing deficient performance and a reasonable probability that, but for counsel's errors, the result of the proceeding would have been different."),
        fact(LandmarkCase, "579 U.S. 438", "Birchfield v. North Dakota (2016)",
            "A breath test, but not a blood test, may be administered as a search incident to a lawful arrest for drunk driving; criminal penalties may not attach to refusal of a warrantless blood draw."),
    ]
}

const CHARGE_LAW: &[ChargeLaw] = &[
    ChargeLaw { pattern: "murder", sections: &["O.C.G.A. § 16-5-1", "O.C.G.A. § 16-3-21", "O.C.G.A. § 17-7-170"] },
    ChargeLaw { pattern: "manslaughter", sections: &["O.C.G.A. § 16-5-1", "O.C.G.A. § 16-3-21"] },
    ChargeLaw { pattern: "aggravated assault", sections: &["O.C.G.A. § 16-5-21", "O.C.G.A. § 16-3-21"] },
    ChargeLaw { pattern: "assault", sections: &["O.C.G.A. § 16-5-20", "O.C.G.A. § 16-5-21", "O.C.G.A. § 16-3-21"] },
    ChargeLaw { pattern: "battery", sections: &["O.C.G.A. § 16-5-23.1", "O.C.G.A. § 16-3-21"] },
    ChargeLaw { pattern: "burglary", sections: &["O.C.G.A. § 16-7-1"] },
    ChargeLaw { pattern: "trespass", sections: &["O.C.G.A. § 16-7-21"] },
    ChargeLaw { pattern: "shoplifting", sections: &["O.C.G.A. § 16-8-14"] },
    ChargeLaw { pattern: "theft", sections: &["O.C.G.A. § 16-8-2"] },
    ChargeLaw { pattern: "armed robbery", sections: &["O.C.G.A. § 16-8-41", "O.C.G.A. § 16-8-40"] },
    ChargeLaw { pattern: "robbery", sections: &["O.C.G.A. § 16-8-40"] },
    ChargeLaw { pattern: "obstruction", sections: &["O.C.G.A. § 16-10-24"] },
    ChargeLaw { pattern: "dui", sections: &["O.C.G.A. § 40-6-391", "579 U.S. 438"] },
    ChargeLaw { pattern: "driving under the influence", sections: &["O.C.G.A. § 40-6-391", "579 U.S. 438"] },
    ChargeLaw { pattern: "possession", sections: &["O.C.G.A. § 16-13-30", "21 U.S.C. § 841"] },
    ChargeLaw { pattern: "controlled substance", sections: &["O.C.G.A. § 16-13-30", "21 U.S.C. § 841"] },
    ChargeLaw { pattern: "firearm", sections: &["18 U.S.C. § 922"] },
    ChargeLaw { pattern: "speedy trial", sections: &["O.C.G.A. § 17-7-170", "U.S. Const. amend. VI"] },
    ChargeLaw { pattern: "bond", sections: &["O.C.G.A. § 17-6-1", "U.S. Const. amend. VIII"] },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_tolerates_spacing() {
        let corpus = LegalCorpus::load();
        assert!(corpus.get("O.C.G.A. § 16-5-21").is_some());
        assert!(corpus.get("o.c.g.a.§16-5-21").is_some());
        assert!(corpus.get("384 U.S. 436").is_some());
        assert!(corpus.get("999 U.S. 999").is_none());
    }

    #[test]
    fn digest_maps_charges_to_sections() {
        let corpus = LegalCorpus::load();
        let digest = corpus.digest_for_topics(&["DUI - Less Safe".to_string()], 60_000);
        assert!(digest.contains("40-6-391"));
        assert!(digest.contains("amend. IV"));
    }

    #[test]
    fn digest_respects_cap() {
        let corpus = LegalCorpus::load();
        let digest = corpus.digest_for_topics(&["murder".to_string()], 400);
        assert!(digest.len() <= 400);
    }

    #[test]
    fn search_is_deterministic() {
        let corpus = LegalCorpus::load();
        let a: Vec<String> = corpus.search("theft", None).iter().map(|f| f.citation.clone()).collect();
        let b: Vec<String> = corpus.search("theft", None).iter().map(|f| f.citation.clone()).collect();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
