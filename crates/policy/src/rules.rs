//! The individual verification rules. Each rule inspects the context and
//! reports ok, not-applicable (hand over to a fallback policy) or a failure
//! with its error code.

use log::warn;

use hash::Imprint;

use crate::codes::VerificationError as E;
use crate::{Outcome, VerificationContext};

pub(crate) struct Rule {
    pub name: &'static str,
    pub check: fn(&VerificationContext) -> Outcome,
}

pub(crate) fn internal() -> Vec<Rule> {
    vec![
        Rule { name: "document-hash-match", check: document_hash_match },
        Rule { name: "document-hash-algorithm-trust", check: document_hash_algorithm_trust },
        Rule { name: "input-level-correction", check: input_level_correction },
        Rule { name: "chain-index-continuity", check: chain_index_continuity },
        Rule { name: "aggregation-algorithm-trust", check: aggregation_algorithm_trust },
        Rule { name: "aggregation-chain-consistency", check: aggregation_chain_consistency },
        Rule { name: "calendar-input-hash", check: calendar_input_hash },
        Rule { name: "calendar-aggregation-time", check: calendar_aggregation_time },
        Rule { name: "calendar-shape", check: calendar_shape },
        Rule { name: "calendar-auth-time", check: calendar_auth_time },
        Rule { name: "calendar-auth-hash", check: calendar_auth_hash },
        Rule { name: "publication-record-time", check: publication_record_time },
        Rule { name: "publication-record-hash", check: publication_record_hash },
    ]
}

pub(crate) fn key_based() -> Vec<Rule> {
    vec![
        Rule { name: "calendar-auth-present", check: calendar_auth_present },
        Rule { name: "certificate-found", check: certificate_found },
        Rule { name: "certificate-validity", check: certificate_validity },
        Rule { name: "calendar-auth-signature", check: calendar_auth_signature },
    ]
}

pub(crate) fn publication_based() -> Vec<Rule> {
    vec![
        Rule { name: "publications-file-present", check: publications_file_present },
        Rule { name: "publication-anchored", check: publication_anchored },
    ]
}

pub(crate) fn calendar_based() -> Vec<Rule> {
    vec![
        Rule { name: "extending-allowed", check: extending_allowed },
        Rule { name: "calendar-database-match", check: calendar_database_match },
    ]
}

/// Folds the aggregation chains leaf to root, carrying the level across
/// chains and checking the output/input handshake between adjacent chains.
fn aggregation_root(ctx: &VerificationContext) -> Result<(Imprint, u64), E> {
    let mut level = 0u64;
    let mut output: Option<Imprint> = None;
    let mut time = None;
    for chain in ctx.signature.aggregation_chains() {
        if let Some(prev) = &output {
            if &chain.input_hash != prev {
                return Err(E::Int1);
            }
        }
        match time {
            None => time = Some(chain.aggregation_time),
            Some(t) if t != chain.aggregation_time => return Err(E::Int2),
            _ => {}
        }
        let (hash, out_level) = chain.fold(level).map_err(|_| E::Int1)?;
        output = Some(hash);
        level = out_level;
    }
    Ok((output.expect("at least one aggregation chain"), level))
}

fn document_hash_match(ctx: &VerificationContext) -> Outcome {
    match &ctx.document_hash {
        Some(document) if document != ctx.signature.document_hash() => Outcome::Fail(E::Gen1),
        _ => Outcome::Ok,
    }
}

fn document_hash_algorithm_trust(ctx: &VerificationContext) -> Outcome {
    if let Ok(algorithm) = ctx.signature.document_hash().algorithm() {
        if algorithm.is_deprecated_at(ctx.signature.aggregation_time()) {
            return Outcome::Fail(E::Int13);
        }
    }
    Outcome::Ok
}

fn input_level_correction(ctx: &VerificationContext) -> Outcome {
    if ctx.aggregation_level == 0 {
        return Outcome::Ok;
    }
    let correction = ctx.signature.aggregation_chains()[0]
        .links
        .first()
        .map_or(0, |link| u64::from(link.level_correction));
    if correction < ctx.aggregation_level {
        return Outcome::Fail(E::Gen3);
    }
    Outcome::Ok
}

fn chain_index_continuity(ctx: &VerificationContext) -> Outcome {
    let chains = ctx.signature.aggregation_chains();
    for pair in chains.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        let continuous = lower.chain_index.len() == upper.chain_index.len() + 1
            && lower.chain_index.starts_with(&upper.chain_index);
        if !continuous {
            return Outcome::Fail(E::Int12);
        }
    }
    Outcome::Ok
}

fn aggregation_algorithm_trust(ctx: &VerificationContext) -> Outcome {
    for chain in ctx.signature.aggregation_chains() {
        if chain.algorithm.is_obsolete_at(chain.aggregation_time) {
            return Outcome::Fail(E::Int15);
        }
        if chain.algorithm.is_deprecated_at(chain.aggregation_time) {
            warn!(
                "aggregation chain uses {} which was already deprecated at signing time",
                chain.algorithm
            );
        }
    }
    Outcome::Ok
}

fn aggregation_chain_consistency(ctx: &VerificationContext) -> Outcome {
    match aggregation_root(ctx) {
        Ok(_) => Outcome::Ok,
        Err(code) => Outcome::Fail(code),
    }
}

fn calendar_input_hash(ctx: &VerificationContext) -> Outcome {
    let Some(calendar) = ctx.signature.calendar_chain() else {
        return Outcome::Ok;
    };
    match aggregation_root(ctx) {
        Ok((root, _)) if root == calendar.input_hash => Outcome::Ok,
        Ok(_) => Outcome::Fail(E::Int3),
        Err(code) => Outcome::Fail(code),
    }
}

fn calendar_aggregation_time(ctx: &VerificationContext) -> Outcome {
    let Some(calendar) = ctx.signature.calendar_chain() else {
        return Outcome::Ok;
    };
    if calendar.aggregation_time() != ctx.signature.aggregation_time() {
        return Outcome::Fail(E::Int4);
    }
    Outcome::Ok
}

fn calendar_shape(ctx: &VerificationContext) -> Outcome {
    let Some(calendar) = ctx.signature.calendar_chain() else {
        return Outcome::Ok;
    };
    match calendar.derived_aggregation_time() {
        Ok(derived) if derived == calendar.aggregation_time() => Outcome::Ok,
        _ => Outcome::Fail(E::Int5),
    }
}

fn calendar_auth_time(ctx: &VerificationContext) -> Outcome {
    let (Some(auth), Some(calendar)) =
        (ctx.signature.calendar_auth(), ctx.signature.calendar_chain())
    else {
        return Outcome::Ok;
    };
    if auth.publication_data.time != calendar.publication_time {
        return Outcome::Fail(E::Int6);
    }
    Outcome::Ok
}

fn calendar_auth_hash(ctx: &VerificationContext) -> Outcome {
    let (Some(auth), Some(calendar)) =
        (ctx.signature.calendar_auth(), ctx.signature.calendar_chain())
    else {
        return Outcome::Ok;
    };
    if auth.publication_data.hash != calendar.fold() {
        return Outcome::Fail(E::Int8);
    }
    Outcome::Ok
}

fn publication_record_time(ctx: &VerificationContext) -> Outcome {
    let (Some(publication), Some(calendar)) =
        (ctx.signature.publication(), ctx.signature.calendar_chain())
    else {
        return Outcome::Ok;
    };
    if publication.data.time != calendar.publication_time {
        return Outcome::Fail(E::Int7);
    }
    Outcome::Ok
}

fn publication_record_hash(ctx: &VerificationContext) -> Outcome {
    let (Some(publication), Some(calendar)) =
        (ctx.signature.publication(), ctx.signature.calendar_chain())
    else {
        return Outcome::Ok;
    };
    if publication.data.hash != calendar.fold() {
        return Outcome::Fail(E::Int9);
    }
    Outcome::Ok
}

fn calendar_auth_present(ctx: &VerificationContext) -> Outcome {
    if ctx.signature.calendar_auth().is_none() {
        return Outcome::Na;
    }
    Outcome::Ok
}

/// The DER certificate the authentication record points at, embedded or
/// resolved through the publications file.
fn auth_certificate(ctx: &VerificationContext) -> Result<Vec<u8>, Outcome> {
    let auth = ctx.signature.calendar_auth().ok_or(Outcome::Na)?;
    if let Some(der) = &auth.signature_data.certificate {
        return Ok(der.clone());
    }
    if let Some(id) = &auth.signature_data.certificate_id {
        let file = ctx.publications_file.ok_or(Outcome::Na)?;
        return match file.certificate_by_id(id) {
            Some(record) => Ok(record.der.clone()),
            None => Err(Outcome::Fail(E::Key1)),
        };
    }
    // Only a repository reference: nothing to resolve locally.
    Err(Outcome::Na)
}

fn certificate_found(ctx: &VerificationContext) -> Outcome {
    match auth_certificate(ctx) {
        Ok(_) => Outcome::Ok,
        Err(outcome) => outcome,
    }
}

fn certificate_validity(ctx: &VerificationContext) -> Outcome {
    let Some(trust_store) = ctx.trust_store else {
        return Outcome::Na;
    };
    let der = match auth_certificate(ctx) {
        Ok(der) => der,
        Err(outcome) => return outcome,
    };
    match trust_store.certificate_validity(&der) {
        Ok((not_before, not_after)) => {
            let at = ctx.signature.aggregation_time();
            if at < not_before || at > not_after {
                Outcome::Fail(E::Key3)
            } else {
                Outcome::Ok
            }
        }
        Err(_) => Outcome::Na,
    }
}

fn calendar_auth_signature(ctx: &VerificationContext) -> Outcome {
    let Some(trust_store) = ctx.trust_store else {
        return Outcome::Na;
    };
    let Some(auth) = ctx.signature.calendar_auth() else {
        return Outcome::Na;
    };
    let der = match auth_certificate(ctx) {
        Ok(der) => der,
        Err(outcome) => return outcome,
    };
    let Ok(signed) = auth.publication_data.signed_bytes() else {
        return Outcome::Fail(E::Key2);
    };
    match trust_store.verify_pkcs1(
        &signed,
        &auth.signature_algorithm,
        &auth.signature_data.value,
        &der,
    ) {
        Ok(()) => Outcome::Ok,
        Err(_) => Outcome::Fail(E::Key2),
    }
}

fn publications_file_present(ctx: &VerificationContext) -> Outcome {
    if ctx.publications_file.is_none() {
        return Outcome::Na;
    }
    Outcome::Ok
}

fn publication_anchored(ctx: &VerificationContext) -> Outcome {
    let Some(file) = ctx.publications_file else {
        return Outcome::Na;
    };
    if let Some(record) = ctx.signature.publication() {
        return match file.publication_by_time(record.data.time) {
            Some(published) if published.data.hash == record.data.hash => Outcome::Ok,
            Some(_) => Outcome::Fail(E::Pub5),
            None => Outcome::Na,
        };
    }
    // No record in the signature: realize the anchor by extending to the
    // first publication after the aggregation round, when permitted.
    if !ctx.extending_allowed {
        return Outcome::Na;
    }
    let Some(target) = file.nearest_publication_after(ctx.signature.aggregation_time()) else {
        return Outcome::Na;
    };
    let Ok(extended) = ctx.extended_calendar(Some(target.data.time)) else {
        return Outcome::Na;
    };
    let root = match aggregation_root(ctx) {
        Ok((root, _)) => root,
        Err(code) => return Outcome::Fail(code),
    };
    if extended.input_hash != root {
        return Outcome::Fail(E::Pub3);
    }
    if extended.fold() != target.data.hash {
        return Outcome::Fail(E::Pub1);
    }
    Outcome::Ok
}

fn extending_allowed(ctx: &VerificationContext) -> Outcome {
    if !ctx.extending_allowed {
        return Outcome::Na;
    }
    Outcome::Ok
}

fn calendar_database_match(ctx: &VerificationContext) -> Outcome {
    let root = match aggregation_root(ctx) {
        Ok((root, _)) => root,
        Err(code) => return Outcome::Fail(code),
    };
    match ctx.signature.calendar_chain() {
        Some(calendar) => {
            let Ok(reference) = ctx.extended_calendar(Some(calendar.publication_time)) else {
                return Outcome::Na;
            };
            if reference.input_hash != root {
                return Outcome::Fail(E::Cal2);
            }
            if calendar.right_link_imprints() != reference.right_link_imprints() {
                return Outcome::Fail(E::Cal4);
            }
            match reference.derived_aggregation_time() {
                Ok(derived) if derived == ctx.signature.aggregation_time() => {}
                _ => return Outcome::Fail(E::Cal3),
            }
            if reference.fold() != calendar.fold() {
                return Outcome::Fail(E::Cal1);
            }
            Outcome::Ok
        }
        None => {
            let Ok(reference) = ctx.extended_calendar(None) else {
                return Outcome::Na;
            };
            if reference.input_hash != root {
                return Outcome::Fail(E::Cal2);
            }
            Outcome::Ok
        }
    }
}
