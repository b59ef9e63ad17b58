use proc_macro::TokenStream;
use quote::quote;
use syn::{Error, ItemFn, Meta, Path};

use crate::Result;

pub(super) fn implement(item: ItemFn, args: &[Meta]) -> Result<TokenStream> {
	let receiver = receiver(args)?;
	let generics = generics(args);

	let out = match generics {
		| Some(generics) => quote! {
			impl #generics #receiver #generics {
				#item
			}
		},
		| None => quote! {
			impl #receiver {
				#item
			}
		},
	};

	Ok(out.into())
}

fn receiver(args: &[Meta]) -> Result<&Path> {
	match args.first() {
		| Some(Meta::Path(path)) => Ok(path),
		| Some(meta) => Err(Error::new_spanned(meta, "first argument must be a type path")),
		| None => Err(Error::new(
			proc_macro2::Span::call_site(),
			"missing the type to implement on",
		)),
	}
}

/// Optional `params(<..>)` argument carrying generics for the impl block.
fn generics(args: &[Meta]) -> Option<proc_macro2::TokenStream> {
	args.iter().skip(1).find_map(|meta| match meta {
		| Meta::List(list) if list.path.is_ident("params") => Some(list.tokens.clone()),
		| _ => None,
	})
}
