//! Prints the basic facts of a stored signature.
//!
//! Usage: inspect <path-to-signature>

use ksi::Context;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: inspect <path-to-signature>"))?;
    let ctx = Context::new();
    let sig = ctx.signature_from_file(std::path::Path::new(&path))?;

    println!("document hash:   {}", sig.document_hash());
    println!("hash algorithm:  {}", sig.hash_algorithm()?);
    println!("aggregation:     {}", sig.aggregation_time());
    match sig.signing_time() {
        Ok(t) => println!("signing time:    {t}"),
        Err(_) => println!("signing time:    (no calendar chain)"),
    }
    let identity = sig.signer_identity();
    if !identity.is_empty() {
        println!("signer identity: {identity}");
    }
    if let Some(publication) = sig.publication() {
        println!("publication:     {}", publication.data.time);
    } else if sig.calendar_auth().is_some() {
        println!("authenticated by a calendar authentication record");
    }
    Ok(())
}
